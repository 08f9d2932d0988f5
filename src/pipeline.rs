//! The polling loop: list unread alerts, scrape each one, persist the jobs,
//! then label the message so it is not picked up again.
//!
//! A message is finalized (labeled and marked read) only after its records
//! are durably appended. Anything that fails between fetch and finalize is
//! quarantined: the email is saved for review, the operator is notified and
//! the message gets the failure labels. A crash before finalize leaves the
//! message unread, so the next tick processes it again; the deduplicated
//! dataset absorbs the repeated rows.

use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use rand::Rng;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::archive::EmailArchive;
use crate::config::AppConfig;
use crate::error::{HarvestError, MailboxError, Result};
use crate::extractor::extract_jobs_from_html;
use crate::logging::OperationTimer;
use crate::mailbox::{LabelKind, LabelSet, Mailbox, Stage};
use crate::metrics::MetricsCollector;
use crate::models::{DedupedDataset, JobRecord, PeriodKey, RawMessage};
use crate::retry::RetryPolicy;
use crate::store::PeriodLog;
use crate::validation::InputValidator;

/// Knobs for one harvester, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct HarvesterSettings {
    /// Mailbox query selecting unread alerts
    pub query: String,
    /// Recipient of quarantine notifications
    pub error_recipient: String,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    /// Upper bound of the random delay added to each pause
    pub poll_jitter: Duration,
}

impl HarvesterSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            query: config.unread_query(),
            error_recipient: config.mailbox.error_recipient.clone(),
            retry: RetryPolicy::from(&config.retry),
            poll_interval: config.poll_interval(),
            poll_jitter: config.poll_jitter(),
        }
    }
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Records appended and the message finalized as a success
    Processed { jobs: usize },
    /// No job block with any field found; the body was flagged and the message finalized as a success
    Flagged,
    /// Saved to the failed folder and finalized with failure labels
    Quarantined { stage: Stage, reason: String },
}

impl MessageOutcome {
    const fn metric_label(&self) -> &'static str {
        match self {
            Self::Processed { .. } => "processed",
            Self::Flagged => "flagged",
            Self::Quarantined { .. } => "quarantined",
        }
    }
}

/// Counters for one polling tick.
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub listed: usize,
    pub processed: usize,
    pub flagged: usize,
    pub quarantined: usize,
    pub jobs_appended: usize,
    /// Set when shutdown was requested before every listed message was handled
    pub interrupted: bool,
    pub deduped: Option<DedupedDataset>,
}

impl TickSummary {
    fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Processed { jobs } => {
                self.processed += 1;
                self.jobs_appended += jobs;
            }
            MessageOutcome::Flagged => self.flagged += 1,
            MessageOutcome::Quarantined { .. } => self.quarantined += 1,
        }
    }
}

/// Why a message is quarantined, by the stage that failed.
enum ScrapeFailure {
    Fetch(String),
    Scrape(String),
}

/// Drives one mailbox into one period log.
pub struct Harvester<M, S> {
    mailbox: M,
    store: S,
    archive: EmailArchive,
    settings: HarvesterSettings,
    metrics: MetricsCollector,
}

impl<M: Mailbox, S: PeriodLog> Harvester<M, S> {
    pub fn new(mailbox: M, store: S, archive: EmailArchive, settings: HarvesterSettings) -> Self {
        Self {
            mailbox,
            store,
            archive,
            settings,
            metrics: MetricsCollector::default(),
        }
    }

    pub fn mailbox(&self) -> &M {
        &self.mailbox
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Polls until `shutdown` turns true, pausing `poll_interval` plus jitter between ticks.
    ///
    /// Tick errors are logged and the loop carries on; a shutdown request is
    /// honored between messages and during the pause.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(query = %self.settings.query, "Harvester started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let today = Local::now().date_naive();
            match self.run_tick(today, &shutdown).await {
                Ok(summary) if summary.listed > 0 => info!(
                    listed = summary.listed,
                    processed = summary.processed,
                    flagged = summary.flagged,
                    quarantined = summary.quarantined,
                    jobs = summary.jobs_appended,
                    "Tick finished"
                ),
                Ok(_) => {}
                Err(e) => error!(error = %e, "Tick aborted"),
            }

            let pause = self.pause();
            tokio::select! {
                () = sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Nobody can signal shutdown any more; keep the cadence.
                        sleep(pause).await;
                    }
                }
            }
        }
        info!("Harvester stopped");
    }

    fn pause(&self) -> Duration {
        let jitter_ms = u64::try_from(self.settings.poll_jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.settings.poll_interval;
        }
        self.settings.poll_interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    /// One pass over the unread alerts, followed by deduplication of the
    /// latest period.
    ///
    /// Returns an error only when the tick could not start or lost its
    /// credentials; per-message failures are quarantined and counted.
    #[instrument(skip(self, shutdown))]
    pub async fn run_tick(&self, today: NaiveDate, shutdown: &watch::Receiver<bool>) -> Result<TickSummary> {
        let timer = OperationTimer::new("run_tick");
        let retry = self.settings.retry;

        retry
            .run("authenticate", &self.metrics, || self.mailbox.authenticate())
            .await
            .map_err(|e| HarvestError::Auth(e.to_string()))?;

        let labels = self.resolve_labels().await?;

        let ids = retry
            .run("list_unread", &self.metrics, || self.mailbox.list_unread(&self.settings.query))
            .await?;

        let mut summary = TickSummary {
            listed: ids.len(),
            ..TickSummary::default()
        };
        if ids.is_empty() {
            debug!("No new emails found");
            self.metrics.record_tick(timer.elapsed());
            return Ok(summary);
        }
        info!(count = ids.len(), "Found unread alerts");

        for (index, id) in ids.iter().enumerate() {
            if *shutdown.borrow() {
                warn!(remaining = ids.len() - index, "Shutdown requested, stopping tick");
                summary.interrupted = true;
                break;
            }
            let outcome = self.process_message(id, &labels, today).await?;
            summary.record(&outcome);
        }

        match self.store.deduplicate_latest() {
            Ok(dataset) => {
                self.metrics.record_dedup(dataset.kept, dataset.dropped);
                summary.deduped = Some(dataset);
            }
            Err(e) => {
                self.metrics.record_error("dedup", "run_tick");
                error!(error = %e, store = %self.store.describe(), "Deduplication failed");
            }
        }

        self.metrics.record_tick(timer.elapsed());
        Ok(summary)
    }

    /// Looks up (or creates) the six processing labels.
    async fn resolve_labels(&self) -> Result<LabelSet> {
        let mut ids: [String; 6] = Default::default();
        for (slot, kind) in ids.iter_mut().zip(LabelKind::ALL) {
            *slot = self
                .settings
                .retry
                .run("ensure_label", &self.metrics, || self.mailbox.ensure_label(kind.display_name()))
                .await?;
        }
        Ok(LabelSet::from_ids(ids))
    }

    /// Fetches, scrapes, persists and finalizes one message.
    ///
    /// Only an auth failure escapes; it aborts the tick with the message
    /// still unread.
    #[instrument(skip(self, labels, today))]
    pub async fn process_message(&self, id: &str, labels: &LabelSet, today: NaiveDate) -> Result<MessageOutcome> {
        let timer = OperationTimer::new("process_message");

        let message = match self.fetch(id).await {
            Ok(message) => message,
            Err(e) if e.is_auth() => return Err(HarvestError::Auth(e.to_string())),
            Err(e) => {
                let outcome = self.quarantine(id, None, labels, ScrapeFailure::Fetch(e.to_string())).await;
                self.metrics.record_message(outcome.metric_label(), timer.elapsed());
                return Ok(outcome);
            }
        };

        let outcome = match self.scrape_and_persist(&message, today) {
            Ok(outcome) => {
                if let Err(e) = self.archive.save_processed(&message) {
                    warn!(error = %e, "Could not archive processed email");
                }
                self.finalize(id, labels, Stage::Done).await;
                outcome
            }
            Err(failure) => self.quarantine(id, Some(&message), labels, failure).await,
        };

        self.metrics.record_message(outcome.metric_label(), timer.elapsed());
        Ok(outcome)
    }

    async fn fetch(&self, id: &str) -> std::result::Result<RawMessage, MailboxError> {
        self.settings
            .retry
            .run("get", &self.metrics, || self.mailbox.get(id))
            .await
    }

    fn scrape_and_persist(&self, message: &RawMessage, today: NaiveDate) -> std::result::Result<MessageOutcome, ScrapeFailure> {
        if message.html_body.trim().is_empty() {
            let malformed = HarvestError::MalformedMessage {
                id: message.id.clone(),
                reason: "empty HTML body".to_string(),
            };
            return Err(ScrapeFailure::Fetch(malformed.to_string()));
        }

        let extraction = extract_jobs_from_html(&message.html_body, today);
        if extraction.blocks_found == 0 {
            warn!(subject = %message.subject, "Job block not found, flagging email");
            return Ok(self.flag(message));
        }

        let records: Vec<JobRecord> = extraction.records.into_iter().filter(|r| !r.is_empty()).collect();
        if records.is_empty() {
            warn!(
                subject = %message.subject,
                blocks = extraction.blocks_found,
                "Job blocks yielded no fields, flagging email"
            );
            return Ok(self.flag(message));
        }

        let jobs = self
            .store
            .append(&records, PeriodKey::of(today))
            .map_err(|e| ScrapeFailure::Scrape(e.to_string()))?;
        self.metrics.record_jobs_extracted(jobs);
        info!(jobs, subject = %message.subject, "Jobs saved");
        Ok(MessageOutcome::Processed { jobs })
    }

    /// Keeps the body for manual review; the message still counts as handled.
    fn flag(&self, message: &RawMessage) -> MessageOutcome {
        if let Err(e) = self.archive.save_flagged(&message.id, &message.html_body, Utc::now()) {
            error!(error = %e, "Could not save flagged email");
        }
        self.metrics.record_flagged();
        MessageOutcome::Flagged
    }

    async fn quarantine(
        &self,
        id: &str,
        message: Option<&RawMessage>,
        labels: &LabelSet,
        failure: ScrapeFailure,
    ) -> MessageOutcome {
        let (stage, reason) = match failure {
            ScrapeFailure::Fetch(reason) => (Stage::Fetch, reason),
            ScrapeFailure::Scrape(reason) => (Stage::Scrape, reason),
        };
        error!(id, ?stage, reason = %reason, "Processing email failed, quarantining");
        self.metrics.record_error("quarantine", "process_message");

        let subject = message.map_or("No Subject", |m| m.subject.as_str());
        let received_at = message.map_or_else(|| Utc::now().fixed_offset(), |m| m.received_at);
        let html = message.map_or("", |m| m.html_body.as_str());
        if let Err(e) = self.archive.save_failed(subject, &received_at, html) {
            error!(error = %e, "Could not save failed email");
        }

        let notice_subject = InputValidator::sanitize_header(&format!("Job alert processing failed: {subject}"));
        let body = format!("Message id: {id}\nSubject: {subject}\nStage: {stage:?}\nError: {reason}\n");
        let notified = self
            .settings
            .retry
            .run("send", &self.metrics, || {
                self.mailbox.send(&self.settings.error_recipient, &notice_subject, &body)
            })
            .await;
        if let Err(e) = notified {
            error!(error = %e, "Could not send error notification");
        }

        self.finalize(id, labels, stage).await;
        MessageOutcome::Quarantined { stage, reason }
    }

    /// Applies the stage labels and marks the message read in one call.
    ///
    /// On failure the message stays unread and is retried next tick.
    async fn finalize(&self, id: &str, labels: &LabelSet, stage: Stage) {
        let (add, remove) = labels.finalize_changes(stage);
        let result = self
            .settings
            .retry
            .run("modify_labels", &self.metrics, || self.mailbox.modify_labels(id, &add, &remove))
            .await;
        match result {
            Ok(()) => debug!(id, ?stage, "Message finalized"),
            Err(e) => {
                self.metrics.record_error("finalize", "modify_labels");
                error!(id, error = %e, "Finalizing email failed");
            }
        }
    }
}
