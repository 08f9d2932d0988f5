//! On-disk captures of raw email HTML.
//!
//! Three stores share one naming scheme:
//!
//! - processed emails: `{emails_dir}/{year}/{Month}/{timestamp}__{subject}.html`
//! - quarantined emails: `{failed_dir}/{timestamp}__{subject}.html`
//! - emails with no job block: `{flagged_dir}/flagged_{utc timestamp}_{id}.html`
//!
//! Captures are never overwritten. When a name is taken, `_1`, `_2`, ... is
//! appended to the stem.

use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use tracing::info;

use crate::error::Result;
use crate::models::RawMessage;
use crate::validation::InputValidator;

const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Writes raw email HTML to the processed, failed and flagged stores.
#[derive(Debug, Clone)]
pub struct EmailArchive {
    emails_dir: PathBuf,
    failed_dir: PathBuf,
    flagged_dir: PathBuf,
}

impl EmailArchive {
    pub fn new(emails_dir: impl Into<PathBuf>, failed_dir: impl Into<PathBuf>, flagged_dir: impl Into<PathBuf>) -> Self {
        Self {
            emails_dir: emails_dir.into(),
            failed_dir: failed_dir.into(),
            flagged_dir: flagged_dir.into(),
        }
    }

    /// Saves a successfully processed email under its year and month.
    pub fn save_processed(&self, message: &RawMessage) -> Result<PathBuf> {
        let folder = self
            .emails_dir
            .join(message.received_at.format("%Y").to_string())
            .join(message.received_at.format("%B").to_string());
        let file_name = capture_file_name(&message.received_at, &message.subject);
        let path = write_html(&folder, &file_name, &message.html_body)?;
        info!(path = %path.display(), "Email saved");
        Ok(path)
    }

    /// Saves whatever is known about a quarantined email.
    pub fn save_failed(&self, subject: &str, received_at: &DateTime<FixedOffset>, html: &str) -> Result<PathBuf> {
        let path = write_html(&self.failed_dir, &capture_file_name(received_at, subject), html)?;
        info!(path = %path.display(), "Failed email saved");
        Ok(path)
    }

    /// Saves an email in which no job block was found, for manual review.
    pub fn save_flagged(&self, message_id: &str, html: &str, now: DateTime<Utc>) -> Result<PathBuf> {
        let file_name = format!(
            "flagged_{}_{}.html",
            now.format("%Y-%m-%dT%H-%M-%S"),
            InputValidator::sanitize_file_component(message_id)
        );
        let path = write_html(&self.flagged_dir, &file_name, html)?;
        info!(path = %path.display(), "No job postings found, HTML content saved");
        Ok(path)
    }
}

/// `{timestamp}__{sanitized subject}.html`
#[must_use]
pub fn capture_file_name(received_at: &DateTime<FixedOffset>, subject: &str) -> String {
    format!(
        "{}__{}.html",
        received_at.format(TIMESTAMP_FORMAT),
        InputValidator::sanitize_subject(subject)
    )
}

/// Writes `html` to `folder/file_name`, or to the first free suffixed name.
fn write_html(folder: &Path, file_name: &str, html: &str) -> Result<PathBuf> {
    create_dir_all(folder)?;
    let (stem, extension) = file_name.rsplit_once('.').unwrap_or((file_name, "html"));
    let mut attempt = 0u32;
    loop {
        let path = if attempt == 0 {
            folder.join(file_name)
        } else {
            folder.join(format!("{stem}_{attempt}.{extension}"))
        };
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                let mut writer = BufWriter::new(file);
                writer.write_all(html.as_bytes())?;
                writer.flush()?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn received() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 11, 3, 8, 15, 0)
            .unwrap()
    }

    #[test]
    fn processed_email_lands_in_month_folder() {
        let dir = tempdir().unwrap();
        let archive = EmailArchive::new(dir.path().join("emails"), dir.path().join("failed"), dir.path().join("flagged"));
        let message = RawMessage {
            id: "abc".into(),
            sender: None,
            subject: "New jobs: Rust/Go!".into(),
            received_at: received(),
            html_body: "<html></html>".into(),
        };

        let path = archive.save_processed(&message).unwrap();
        assert_eq!(
            path,
            dir.path()
                .join("emails/2024/November/2024_11_03_08_15_00__New jobs RustGo.html")
        );
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<html></html>");
    }

    #[test]
    fn flagged_email_is_keyed_by_utc_time() {
        let dir = tempdir().unwrap();
        let archive = EmailArchive::new(dir.path(), dir.path(), dir.path().join("flagged"));
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let path = archive.save_flagged("18c2f", "<p/>", now).unwrap();
        assert!(path.ends_with("flagged/flagged_2024-01-02T03-04-05_18c2f.html"));
    }

    #[test]
    fn colliding_failed_captures_are_all_kept() {
        let dir = tempdir().unwrap();
        let archive = EmailArchive::new(dir.path().join("emails"), dir.path().join("failed"), dir.path().join("flagged"));

        let first = archive.save_failed("Jobs", &received(), "<p>one</p>").unwrap();
        let second = archive.save_failed("Jobs", &received(), "<p>two</p>").unwrap();
        let third = archive.save_failed("Jobs", &received(), "<p>three</p>").unwrap();

        assert!(first.ends_with("failed/2024_11_03_08_15_00__Jobs.html"));
        assert!(second.ends_with("failed/2024_11_03_08_15_00__Jobs_1.html"));
        assert!(third.ends_with("failed/2024_11_03_08_15_00__Jobs_2.html"));
        assert_eq!(std::fs::read_to_string(first).unwrap(), "<p>one</p>");
        assert_eq!(std::fs::read_to_string(second).unwrap(), "<p>two</p>");
    }
}
