use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metric names emitted by the harvester.
///
/// Only the `metrics` facade is used here; installing a recorder/exporter is
/// left to whoever embeds the harvester.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    pub messages_processed_total: &'static str,
    pub message_processing_duration: &'static str,
    pub jobs_extracted_total: &'static str,
    pub flagged_emails_total: &'static str,
    pub mailbox_retries_total: &'static str,
    pub dedup_rows_kept: &'static str,
    pub dedup_rows_dropped: &'static str,
    pub tick_duration: &'static str,
    pub errors_total: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            messages_processed_total: "job_alerts_messages_processed_total",
            message_processing_duration: "job_alerts_message_processing_duration_seconds",
            jobs_extracted_total: "job_alerts_jobs_extracted_total",
            flagged_emails_total: "job_alerts_flagged_emails_total",
            mailbox_retries_total: "job_alerts_mailbox_retries_total",
            dedup_rows_kept: "job_alerts_dedup_rows_kept",
            dedup_rows_dropped: "job_alerts_dedup_rows_dropped",
            tick_duration: "job_alerts_tick_duration_seconds",
            errors_total: "job_alerts_errors_total",
        }
    }
}

impl MetricsCollector {
    /// Record one finalized message
    pub fn record_message(&self, outcome: &'static str, duration: Duration) {
        counter!(self.messages_processed_total, "outcome" => outcome).increment(1);
        histogram!(self.message_processing_duration, "outcome" => outcome).record(duration.as_secs_f64());
    }

    /// Record job records appended for one message
    pub fn record_jobs_extracted(&self, count: usize) {
        counter!(self.jobs_extracted_total).increment(count as u64);
    }

    /// Record an email with no detectable job block
    pub fn record_flagged(&self) {
        counter!(self.flagged_emails_total).increment(1);
    }

    /// Record a retried mailbox call
    pub fn record_retry(&self, operation: &str) {
        counter!(self.mailbox_retries_total, "operation" => operation.to_string()).increment(1);
    }

    /// Record the size of the last deduplicated dataset
    pub fn record_dedup(&self, kept: usize, dropped: usize) {
        gauge!(self.dedup_rows_kept).set(kept as f64);
        gauge!(self.dedup_rows_dropped).set(dropped as f64);
    }

    /// Record a finished polling tick
    pub fn record_tick(&self, duration: Duration) {
        histogram!(self.tick_duration).record(duration.as_secs_f64());
    }

    /// Record error metrics
    pub fn record_error(&self, error_type: &'static str, operation: &'static str) {
        counter!(self.errors_total, "type" => error_type, "operation" => operation).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::default();
        assert_eq!(collector.messages_processed_total, "job_alerts_messages_processed_total");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let collector = MetricsCollector::default();
        collector.record_message("success", Duration::from_millis(5));
        collector.record_jobs_extracted(2);
        collector.record_retry("get");
        collector.record_dedup(10, 3);
    }
}
