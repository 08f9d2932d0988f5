//! Maps the rows of a job block onto a [`JobRecord`].
//!
//! Alert emails come in two row layouts. Each layout is a [`LayoutDetector`]
//! that either claims the whole block and returns a complete field mapping,
//! or declines it. Detectors are tried in [`DETECTORS`] order.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use scraper::Html;
use tracing::{debug, warn};

use crate::models::{JobRecord, RowRecord};
use crate::segmenter::find_job_blocks;
use crate::tokenizer::tokenize_block;

static RATING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]{1,2})?$").expect("static regex"));
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").expect("static regex"));

/// Separator between location and job type in the two-column layout.
pub const LOCATION_TYPE_SEPARATOR: char = '•';

/// Job fields read straight from the rows, before any date arithmetic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFields {
    pub title: Option<String>,
    pub link: Option<String>,
    pub company: Option<String>,
    pub rating: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub description: Option<String>,
    pub days_posted_text: Option<String>,
}

/// A known row layout of a job block.
pub trait LayoutDetector: Sync {
    fn name(&self) -> &'static str;

    /// Complete mapping for `rows`, or `None` when the layout does not apply.
    fn extract(&self, rows: &[RowRecord]) -> Option<JobFields>;
}

/// Layout where the company row carries the rating in a second cell.
///
/// Applies when any row of the block has a second data column.
#[derive(Debug, Clone, Copy)]
pub struct TwoColumnLayout;

/// Layout with one cell per row and a combined "company rating - location" line.
///
/// Applies when no row of the block has a second data column.
#[derive(Debug, Clone, Copy)]
pub struct SingleColumnLayout;

/// Detectors in priority order.
pub static DETECTORS: [&dyn LayoutDetector; 2] = [&TwoColumnLayout, &SingleColumnLayout];

fn has_second_column(rows: &[RowRecord]) -> bool {
    rows.iter().any(|row| row.cells.len() >= 2)
}

fn text_of(row: &RowRecord, column: usize) -> Option<String> {
    non_empty(row.cell(column))
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

impl LayoutDetector for TwoColumnLayout {
    fn name(&self) -> &'static str {
        "two-column"
    }

    fn extract(&self, rows: &[RowRecord]) -> Option<JobFields> {
        if !has_second_column(rows) {
            return None;
        }

        let last = rows.len();
        let mut fields = JobFields::default();
        for row in rows {
            match row.number {
                1 => {
                    fields.title = text_of(row, 1);
                    fields.link.clone_from(&row.link);
                }
                3 => {
                    fields.company = text_of(row, 1);
                    fields.rating = text_of(row, 2);
                }
                4 => {
                    let (location, job_type) = split_location_type(row.cell(1));
                    fields.location = location;
                    fields.job_type = job_type;
                }
                n if n == last => fields.days_posted_text = text_of(row, 1),
                n if n + 1 == last => fields.description = text_of(row, 1),
                _ => {}
            }
        }
        Some(fields)
    }
}

impl LayoutDetector for SingleColumnLayout {
    fn name(&self) -> &'static str {
        "single-column"
    }

    fn extract(&self, rows: &[RowRecord]) -> Option<JobFields> {
        if has_second_column(rows) {
            return None;
        }

        let last = rows.len();
        let mut fields = JobFields::default();
        for row in rows {
            match row.number {
                1 => {
                    fields.title = text_of(row, 1);
                    fields.link.clone_from(&row.link);
                }
                2 => {
                    let parsed = split_company_line(row.cell(1).unwrap_or_default());
                    fields.company = parsed.company;
                    fields.rating = parsed.rating;
                    fields.location = parsed.location;
                }
                3 => fields.job_type = text_of(row, 1),
                n if n == last => fields.days_posted_text = text_of(row, 1),
                n if n + 1 == last => fields.description = text_of(row, 1),
                _ => {}
            }
        }
        Some(fields)
    }
}

/// Splits `"Remote • Full-time"` into location and job type.
#[must_use]
pub fn split_location_type(text: Option<&str>) -> (Option<String>, Option<String>) {
    match text {
        Some(text) if text.contains(LOCATION_TYPE_SEPARATOR) => {
            let mut parts = text.split(LOCATION_TYPE_SEPARATOR);
            (non_empty(parts.next()), non_empty(parts.next()))
        }
        other => (non_empty(other), None),
    }
}

/// Company, rating and location parsed from a single-column company line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyLine {
    pub company: Option<String>,
    pub rating: Option<String>,
    pub location: Option<String>,
}

/// Parses `"Acme Corp 4.5 - Remote"`.
///
/// The text is split on the first hyphen. On the left side the trailing
/// token becomes the rating when it looks like `4`, `4.5` or `4.25`.
#[must_use]
pub fn split_company_line(text: &str) -> CompanyLine {
    let Some((left, right)) = text.split_once('-') else {
        return CompanyLine {
            company: non_empty(Some(text)),
            ..CompanyLine::default()
        };
    };

    let left = left.replace('\u{a0}', " ");
    let (company, rating) = split_company_rating(left.trim());
    CompanyLine {
        company,
        rating,
        location: non_empty(Some(right)),
    }
}

/// Splits `"Acme Corp 4.5"` into `("Acme Corp", "4.5")`.
#[must_use]
pub fn split_company_rating(text: &str) -> (Option<String>, Option<String>) {
    let text = text.trim();
    if let Some((head, tail)) = text.rsplit_once(char::is_whitespace) {
        let candidate = tail.trim();
        if RATING.is_match(candidate) {
            return (non_empty(Some(head)), Some(candidate.to_string()));
        }
    }
    (non_empty(Some(text)), None)
}

/// Age of a posting derived from its days-posted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingAge {
    pub days_ago: Option<u32>,
    pub posting_date: Option<NaiveDate>,
}

/// Interprets `"3 days ago"`, `"a day ago"`, `"Just posted"` relative to `fetched`.
///
/// Text that mentions neither dates the posting to the fetch day with an
/// unknown age. A digit run too large to subtract is treated the same way.
#[must_use]
pub fn parse_days_posted(text: Option<&str>, fetched: NaiveDate) -> PostingAge {
    let Some(text) = text else {
        return PostingAge {
            days_ago: None,
            posting_date: None,
        };
    };

    let lowered = text.to_lowercase();
    let days_ago = if lowered.contains("day") {
        match DIGITS.find(&lowered) {
            Some(digits) => digits.as_str().parse::<u32>().ok(),
            None => Some(1),
        }
    } else if lowered.contains("just posted") {
        Some(0)
    } else {
        None
    };

    let dated = days_ago.and_then(|days| {
        fetched
            .checked_sub_days(Days::new(u64::from(days)))
            .map(|date| (days, date))
    });

    match dated {
        Some((days, date)) => PostingAge {
            days_ago: Some(days),
            posting_date: Some(date),
        },
        None => PostingAge {
            days_ago: None,
            posting_date: Some(fetched),
        },
    }
}

/// Builds the record for one block's rows.
///
/// Never fails: fields the layout cannot find stay `None`.
#[must_use]
pub fn extract_job(rows: &[RowRecord], fetched: NaiveDate) -> JobRecord {
    let fields = DETECTORS
        .iter()
        .find_map(|detector| {
            detector.extract(rows).inspect(|_| {
                debug!(layout = detector.name(), rows = rows.len(), "Layout matched");
            })
        })
        .unwrap_or_default();

    let age = parse_days_posted(fields.days_posted_text.as_deref(), fetched);

    JobRecord {
        title: fields.title,
        link: fields.link,
        company: fields.company,
        rating: fields.rating,
        location: fields.location,
        job_type: fields.job_type,
        description: fields.description,
        days_posted_text: fields.days_posted_text,
        days_ago: age.days_ago,
        posting_date: age.posting_date,
        fetched_date: fetched,
    }
}

/// Outcome of scraping one email body.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// One record per job block, in document order
    pub records: Vec<JobRecord>,
    /// Number of blocks the segmenter found
    pub blocks_found: usize,
}

/// Segments an email body and extracts one record per job block.
///
/// Parsing stays inside this call so no DOM handle outlives it.
#[must_use]
pub fn extract_jobs_from_html(html: &str, fetched: NaiveDate) -> Extraction {
    let document = Html::parse_document(html);
    let blocks = find_job_blocks(&document);

    let records: Vec<JobRecord> = blocks
        .iter()
        .map(|block| extract_job(&tokenize_block(block), fetched))
        .collect();

    for (index, record) in records.iter().enumerate() {
        if record.is_empty() {
            warn!(block = index + 1, "Job block produced no fields");
        }
    }

    Extraction {
        blocks_found: blocks.len(),
        records,
    }
}
