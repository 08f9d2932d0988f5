//! Data models for job alert handling and storage
//!
//! This module contains the data structures passed between the mailbox, the
//! HTML parsing stages and the period datasets.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// An email as fetched from the mailbox. Immutable once fetched.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Mailbox message identifier
    pub id: String,
    /// `From` header, when present
    pub sender: Option<String>,
    /// `Subject` header (`"No Subject"` when absent)
    pub subject: String,
    /// When the mailbox received the message
    pub received_at: DateTime<FixedOffset>,
    /// Decoded `text/html` body
    pub html_body: String,
}

/// One `<tr>` of a job block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRecord {
    /// 1-based position within the block
    pub number: usize,
    /// Trimmed `<td>` texts in column order
    pub cells: Vec<String>,
    /// First anchor `href` in the row
    pub link: Option<String>,
    /// Markup of the whole row
    pub raw_html: String,
}

impl RowRecord {
    /// Text of the 1-based column `column`, `None` when the row is shorter.
    #[must_use]
    pub fn cell(&self, column: usize) -> Option<&str> {
        column
            .checked_sub(1)
            .and_then(|index| self.cells.get(index))
            .map(String::as_str)
    }
}

/// A job posting extracted from one block of an alert email.
///
/// Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub title: Option<String>,
    pub link: Option<String>,
    pub company: Option<String>,
    pub rating: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "days_posted")]
    pub days_posted_text: Option<String>,
    #[serde(rename = "days")]
    pub days_ago: Option<u32>,
    pub posting_date: Option<NaiveDate>,
    pub fetched_date: NaiveDate,
}

impl JobRecord {
    /// CSV header, matching the serde field names above.
    pub const HEADERS: [&'static str; 11] = [
        "title",
        "link",
        "company",
        "rating",
        "location",
        "type",
        "description",
        "days_posted",
        "days",
        "posting_date",
        "fetched_date",
    ];

    /// Key used to collapse repeated postings.
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        (
            self.title.clone(),
            self.link.clone(),
            self.company.clone(),
            self.days_posted_text.clone(),
        )
    }

    /// True when extraction produced nothing but the dates.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.link.is_none()
            && self.company.is_none()
            && self.rating.is_none()
            && self.location.is_none()
            && self.job_type.is_none()
            && self.description.is_none()
            && self.days_posted_text.is_none()
    }
}

/// `(title, link, company, days_posted_text)`
pub type DedupKey = (Option<String>, Option<String>, Option<String>, Option<String>);

/// Calendar month a period dataset belongs to.
///
/// Ordering is by year, then month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeriodKey {
    pub year: i32,
    pub month: u32,
}

impl PeriodKey {
    #[must_use]
    pub const fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Period of a fetch run.
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self::new(date.year(), date.month())
    }

    /// File name of the raw period dataset, e.g. `2024_11.csv`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{self}.csv")
    }

    /// File name of the deduplicated dataset, e.g. `2024_11_pre_processed.csv`.
    #[must_use]
    pub fn deduped_file_name(&self) -> String {
        format!("{self}_pre_processed.csv")
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}_{:02}", self.year, self.month)
    }
}

impl FromStr for PeriodKey {
    type Err = String;

    /// Parses a `YYYY_MM` file stem.
    fn from_str(stem: &str) -> Result<Self, Self::Err> {
        let (year, month) = stem
            .split_once('_')
            .ok_or_else(|| format!("not a period stem: {stem}"))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(format!("not a period stem: {stem}"));
        }
        let year: i32 = year.parse().map_err(|_| format!("bad year in {stem}"))?;
        let month: u32 = month.parse().map_err(|_| format!("bad month in {stem}"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in {stem}"));
        }
        Ok(Self::new(year, month))
    }
}

/// Result of compacting a period dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupedDataset {
    /// Period that was compacted
    pub period: PeriodKey,
    /// Where the compacted file was written
    pub path: std::path::PathBuf,
    /// Rows written
    pub kept: usize,
    /// Rows dropped as repeats
    pub dropped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_key_round_trips_through_stem() {
        let key: PeriodKey = "2024_03".parse().unwrap();
        assert_eq!(key, PeriodKey::new(2024, 3));
        assert_eq!(key.to_string(), "2024_03");
        assert_eq!(key.deduped_file_name(), "2024_03_pre_processed.csv");
    }

    #[test]
    fn period_key_rejects_other_stems() {
        assert!("2024_03_pre_processed".parse::<PeriodKey>().is_err());
        assert!("2024_13".parse::<PeriodKey>().is_err());
        assert!("notes".parse::<PeriodKey>().is_err());
    }

    #[test]
    fn period_keys_order_by_year_then_month() {
        assert!(PeriodKey::new(2023, 12) < PeriodKey::new(2024, 1));
        assert!(PeriodKey::new(2024, 2) < PeriodKey::new(2024, 10));
    }

    #[test]
    fn row_cell_is_one_based() {
        let row = RowRecord {
            number: 1,
            cells: vec!["a".into(), "b".into()],
            link: None,
            raw_html: String::new(),
        };
        assert_eq!(row.cell(1), Some("a"));
        assert_eq!(row.cell(2), Some("b"));
        assert_eq!(row.cell(0), None);
        assert_eq!(row.cell(3), None);
    }
}
