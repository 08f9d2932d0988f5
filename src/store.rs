//! Period datasets: an append-only CSV log per calendar month plus the
//! deduplicated copy derived from it.
//!
//! Everything that knows about directories and file names sits behind
//! [`PeriodLog`], so the extractor and the mailbox loop only deal in
//! [`PeriodKey`]s and [`JobRecord`]s.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use tracing::{debug, error, info};

use crate::error::{HarvestError, Result};
use crate::models::{DedupedDataset, JobRecord, PeriodKey};

/// Append-only storage of job records, keyed by month.
pub trait PeriodLog {
    /// Appends `records` to the dataset of `period`, creating it if needed.
    ///
    /// All records of one call land in a single write.
    fn append(&self, records: &[JobRecord], period: PeriodKey) -> Result<usize>;

    /// Periods that have a dataset, oldest first.
    fn periods(&self) -> Result<Vec<PeriodKey>>;

    /// Every record of one period, in append order.
    fn read_period(&self, period: PeriodKey) -> Result<Vec<JobRecord>>;

    /// Writes the deduplicated copy of `period`.
    fn deduplicate(&self, period: PeriodKey) -> Result<DedupedDataset>;

    fn latest_period(&self) -> Result<Option<PeriodKey>> {
        Ok(self.periods()?.last().copied())
    }

    /// Deduplicates the most recent period; errors when there is none.
    fn deduplicate_latest(&self) -> Result<DedupedDataset> {
        let period = self
            .latest_period()?
            .ok_or_else(|| HarvestError::NoPeriodData(self.describe()))?;
        self.deduplicate(period)
    }

    /// The newest `limit` periods (all when `None`) with their records, newest first.
    fn read_recent(&self, limit: Option<usize>) -> Result<Vec<(PeriodKey, Vec<JobRecord>)>> {
        let mut periods = self.periods()?;
        periods.reverse();
        if let Some(limit) = limit {
            periods.truncate(limit);
        }
        periods
            .into_iter()
            .map(|period| Ok((period, self.read_period(period)?)))
            .collect()
    }

    /// Where the log lives, for error messages.
    fn describe(&self) -> String;
}

/// [`PeriodLog`] backed by `{raw_dir}/YYYY_MM.csv` files, deduplicated into
/// `{processed_dir}/YYYY_MM_pre_processed.csv`.
#[derive(Debug, Clone)]
pub struct CsvPeriodLog {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
}

impl CsvPeriodLog {
    pub fn new(raw_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            processed_dir: processed_dir.into(),
        }
    }

    #[must_use]
    pub fn period_path(&self, period: PeriodKey) -> PathBuf {
        self.raw_dir.join(period.file_name())
    }

    #[must_use]
    pub fn deduped_path(&self, period: PeriodKey) -> PathBuf {
        self.processed_dir.join(period.deduped_file_name())
    }
}

/// Serializes records as CSV, with the header row when `with_header` is set.
fn encode_records<'a>(records: impl IntoIterator<Item = &'a JobRecord>, with_header: bool) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    if with_header {
        writer.write_record(JobRecord::HEADERS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.into_inner().map_err(|e| HarvestError::Io(e.into_error()))
}

/// Appends `buffer` and syncs it. On failure the file is truncated back to
/// its previous length so no partial row is left behind.
fn write_or_roll_back(file: &mut File, buffer: &[u8]) -> Result<()> {
    let previous_len = file.metadata()?.len();
    let written = file.write_all(buffer).and_then(|()| file.sync_data());
    if let Err(e) = written {
        roll_back(file, previous_len);
        return Err(e.into());
    }
    Ok(())
}

fn roll_back(file: &File, previous_len: u64) {
    if let Err(e) = file.set_len(previous_len).and_then(|()| file.sync_data()) {
        error!(error = %e, previous_len, "Could not roll back partial append");
    }
}

fn is_missing_or_empty(path: &Path) -> bool {
    fs::metadata(path).map_or(true, |meta| meta.len() == 0)
}

impl PeriodLog for CsvPeriodLog {
    fn append(&self, records: &[JobRecord], period: PeriodKey) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        fs::create_dir_all(&self.raw_dir)?;
        let path = self.period_path(period);
        let fresh = is_missing_or_empty(&path);
        let buffer = encode_records(records, fresh)?;

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        write_or_roll_back(&mut file, &buffer)?;

        if fresh {
            info!(path = %path.display(), rows = records.len(), "Data written as a fresh file");
        } else {
            info!(path = %path.display(), rows = records.len(), "Data appended");
        }
        Ok(records.len())
    }

    fn periods(&self) -> Result<Vec<PeriodKey>> {
        let entries = match fs::read_dir(&self.raw_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut periods = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
                continue;
            }
            match path.file_stem().and_then(|stem| stem.to_str()).map(str::parse::<PeriodKey>) {
                Some(Ok(period)) => periods.push(period),
                _ => debug!(path = %path.display(), "Skipping file that is not a period dataset"),
            }
        }
        periods.sort_unstable();
        Ok(periods)
    }

    fn read_period(&self, period: PeriodKey) -> Result<Vec<JobRecord>> {
        let mut reader = ReaderBuilder::new().from_path(self.period_path(period))?;
        reader
            .deserialize()
            .map(|row| row.map_err(HarvestError::from))
            .collect()
    }

    fn deduplicate(&self, period: PeriodKey) -> Result<DedupedDataset> {
        let records = self.read_period(period)?;
        let total = records.len();

        let mut seen = HashSet::new();
        let unique: Vec<&JobRecord> = records
            .iter()
            .filter(|record| seen.insert(record.dedup_key()))
            .collect();

        fs::create_dir_all(&self.processed_dir)?;
        let path = self.deduped_path(period);
        let staging = path.with_extension("csv.tmp");
        fs::write(&staging, encode_records(unique.iter().copied(), true)?)?;
        fs::rename(&staging, &path)?;

        let dataset = DedupedDataset {
            period,
            path,
            kept: unique.len(),
            dropped: total - unique.len(),
        };
        info!(
            period = %period,
            kept = dataset.kept,
            dropped = dataset.dropped,
            path = %dataset.path.display(),
            "Deduplicated period dataset"
        );
        Ok(dataset)
    }

    fn describe(&self) -> String {
        self.raw_dir.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    #[test]
    fn failed_append_leaves_earlier_rows_intact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2024_01.csv");
        fs::write(&path, "title\nEngineer\n").unwrap();

        // A read-only handle makes the write fail after the length is taken.
        let mut file = File::open(&path).unwrap();
        let result = write_or_roll_back(&mut file, b"Analyst\n");
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "title\nEngineer\n");
    }

    #[test]
    fn roll_back_drops_partial_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2024_01.csv");
        fs::write(&path, "title,link\nEngineer,\n").unwrap();

        let mut file = OpenOptions::new().read(true).append(true).open(&path).unwrap();
        let previous_len = file.metadata().unwrap().len();
        file.write_all(b"Analyst,https://ex").unwrap();
        roll_back(&file, previous_len);

        assert_eq!(fs::read_to_string(&path).unwrap(), "title,link\nEngineer,\n");
    }

    #[test]
    fn successful_append_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2024_01.csv");
        fs::write(&path, "title\n").unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write_or_roll_back(&mut file, b"Engineer\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "title\nEngineer\n");
    }

    #[test]
    fn append_of_nothing_creates_no_file() {
        let dir = tempdir().unwrap();
        let log = CsvPeriodLog::new(dir.path().join("raw"), dir.path().join("processed"));
        assert_eq!(log.append(&[], PeriodKey::new(2024, 1)).unwrap(), 0);
        assert!(log.periods().unwrap().is_empty());
    }

    #[test]
    fn header_written_once() {
        let dir = tempdir().unwrap();
        let log = CsvPeriodLog::new(dir.path(), dir.path().join("processed"));
        let record = JobRecord {
            title: Some("Engineer".into()),
            link: None,
            company: None,
            rating: None,
            location: None,
            job_type: None,
            description: None,
            days_posted_text: None,
            days_ago: None,
            posting_date: None,
            fetched_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        };
        let period = PeriodKey::new(2024, 1);
        log.append(&[record.clone()], period).unwrap();
        log.append(&[record], period).unwrap();

        let contents = fs::read_to_string(log.period_path(period)).unwrap();
        assert_eq!(contents.matches("title,link").count(), 1);
        assert_eq!(contents.lines().count(), 3);
    }
}
