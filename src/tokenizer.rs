//! Turns a job block into its ordered rows.

use std::sync::LazyLock;

use scraper::Selector;

use crate::models::RowRecord;
use crate::segmenter::JobBlock;

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("static selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("static selector"));
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));

/// Enumerates every `<tr>` below the block in document order.
///
/// Rows are numbered from 1 and none are dropped: a spacer row with no cells
/// keeps its number so the positional layouts line up.
#[must_use]
pub fn tokenize_block(block: &JobBlock<'_>) -> Vec<RowRecord> {
    block
        .element()
        .select(&ROW)
        .enumerate()
        .map(|(index, row)| RowRecord {
            number: index + 1,
            cells: row
                .select(&CELL)
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .collect(),
            link: row
                .select(&LINK)
                .next()
                .and_then(|anchor| anchor.value().attr("href"))
                .map(str::to_string),
            raw_html: row.html(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::find_job_blocks;
    use scraper::Html;

    #[test]
    fn rows_keep_positions_and_first_link() {
        let html = r#"<table>
            <tr><td><a href="https://example.com/a">Title</a> <a href="https://example.com/b">x</a></td></tr>
            <tr></tr>
            <tr><td>  Acme  </td><td>4.1</td></tr>
            <tr><td>2 days ago</td></tr>
        </table>"#;
        let document = Html::parse_document(html);
        let blocks = find_job_blocks(&document);
        assert_eq!(blocks.len(), 1);

        let rows = tokenize_block(&blocks[0]);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].number, 1);
        assert_eq!(rows[0].link.as_deref(), Some("https://example.com/a"));
        assert_eq!(rows[1].number, 2);
        assert!(rows[1].cells.is_empty());
        assert_eq!(rows[2].cells, vec!["Acme".to_string(), "4.1".to_string()]);
        assert_eq!(rows[3].cell(1), Some("2 days ago"));
    }
}
