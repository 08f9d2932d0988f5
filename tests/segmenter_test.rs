//! Tests for job block detection and row tokenization

use job_alert_harvester::segmenter::{find_job_blocks, has_job_marker};
use job_alert_harvester::tokenizer::tokenize_block;
use scraper::Html;

#[test]
fn test_block_is_innermost_table() {
    let html = r#"<table id="outer"><tr><td>
        <table id="inner"><tr><td>Analyst</td></tr><tr><td>5 days ago</td></tr></table>
    </td></tr></table>"#;
    let document = Html::parse_document(html);
    let blocks = find_job_blocks(&document);

    assert_eq!(blocks.len(), 1);
    let rows = tokenize_block(&blocks[0]);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].cell(1), Some("Analyst"));
}

#[test]
fn test_explicit_tbody_is_the_block() {
    let html = "<table><thead><tr><th>Header</th></tr></thead>\
        <tbody><tr><td>Clerk</td></tr><tr><td>Just posted</td></tr></tbody></table>";
    let document = Html::parse_document(html);
    let blocks = find_job_blocks(&document);

    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].element().value().name(), "tbody");
    assert_eq!(tokenize_block(&blocks[0]).len(), 2);
}

#[test]
fn test_two_markers_in_one_block_count_once() {
    let html = "<table><tr><td>Posted 2 days ago</td></tr><tr><td>Reposted 1 day ago</td></tr></table>";
    let document = Html::parse_document(html);
    assert_eq!(find_job_blocks(&document).len(), 1);
}

#[test]
fn test_blocks_follow_document_order() {
    let html = "<table><tr><td>First</td></tr><tr><td>1 day ago</td></tr></table>\
        <p>separator</p>\
        <table><tr><td>Second</td></tr><tr><td>2 days ago</td></tr></table>";
    let document = Html::parse_document(html);
    let titles: Vec<String> = find_job_blocks(&document)
        .iter()
        .map(|block| tokenize_block(block)[0].cells[0].clone())
        .collect();
    assert_eq!(titles, vec!["First".to_string(), "Second".to_string()]);
}

#[test]
fn test_block_html_is_serialized_markup() {
    let document = Html::parse_document("<table><tr><td>Just posted</td></tr></table>");
    let blocks = find_job_blocks(&document);
    assert!(blocks[0].html().contains("Just posted"));
}

#[test]
fn test_marker_detection() {
    assert!(has_job_marker("Posted 30+ days ago"));
    assert!(has_job_marker("JUST POSTED"));
    assert!(!has_job_marker("Posted today"));
    assert!(!has_job_marker(""));
}

#[test]
fn test_empty_document_has_no_blocks() {
    let document = Html::parse_document("");
    assert!(find_job_blocks(&document).is_empty());
}
