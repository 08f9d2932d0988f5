//! Tests for configuration defaults, layering and validation

use std::fs;
use std::time::Duration;

use job_alert_harvester::config::AppConfig;
use job_alert_harvester::retry::RetryPolicy;
use tempfile::TempDir;

#[test]
fn test_default_mailbox_config() {
    let config = AppConfig::default();

    assert_eq!(config.mailbox.senders, vec!["alert@indeed.com".to_string()]);
    assert_eq!(config.mailbox.poll_interval_secs, 10);
    assert_eq!(config.mailbox.poll_jitter_ms, 500);
    assert_eq!(config.mailbox.request_timeout_secs, 30);
    assert!(config.mailbox.api_base_url.starts_with("https://"));
}

#[test]
fn test_default_storage_config() {
    let config = AppConfig::default();

    assert_eq!(config.storage.raw_dir, "./data/raw");
    assert_eq!(config.storage.processed_dir, "./data/pre_processed");
    assert_eq!(config.storage.emails_dir, "./data/emails");
    assert_eq!(config.storage.failed_dir, "./data/failed_emails");
    assert_eq!(config.storage.flagged_dir, "./log/flagged_html_files");
}

#[test]
fn test_default_logging_config() {
    let config = AppConfig::default();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.file_path, None);
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_default_config_is_valid() {
    assert!(AppConfig::default().validate().is_ok());
}

#[test]
fn test_poll_durations() {
    let config = AppConfig::default();
    assert_eq!(config.poll_interval(), Duration::from_secs(10));
    assert_eq!(config.poll_jitter(), Duration::from_millis(500));
}

#[test]
fn test_retry_policy_from_config() {
    let mut config = AppConfig::default();
    config.retry.max_attempts = 5;
    config.retry.base_delay_ms = 100;
    config.retry.max_delay_ms = 1000;

    let policy = RetryPolicy::from(&config.retry);
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.backoff(1), Duration::from_millis(100));
    assert_eq!(policy.backoff(5), Duration::from_millis(1000));
}

#[test]
fn test_validation_rejects_bad_sender() {
    let mut config = AppConfig::default();
    config.mailbox.senders = vec!["not-an-address".to_string()];
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_bad_recipient() {
    let mut config = AppConfig::default();
    config.mailbox.error_recipient = "admin".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_zero_poll_interval() {
    let mut config = AppConfig::default();
    config.mailbox.poll_interval_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_inverted_delays() {
    let mut config = AppConfig::default();
    config.retry.base_delay_ms = 5000;
    config.retry.max_delay_ms = 1000;
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_shared_dataset_dirs() {
    let mut config = AppConfig::default();
    config.storage.processed_dir = config.storage.raw_dir.clone();
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_unknown_log_level() {
    let mut config = AppConfig::default();
    config.logging.level = "verbose".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_unknown_log_format() {
    let mut config = AppConfig::default();
    config.logging.format = "xml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_explicit_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("harvester.toml");
    fs::write(
        &path,
        r#"
[mailbox]
senders = ["jobs@example.com", "alerts@example.org"]
poll_interval_secs = 60

[retry]
max_attempts = 5
"#,
    )
    .unwrap();

    let config = AppConfig::load_from(Some(&path)).unwrap();
    assert_eq!(
        config.mailbox.senders,
        vec!["jobs@example.com".to_string(), "alerts@example.org".to_string()]
    );
    assert_eq!(config.mailbox.poll_interval_secs, 60);
    assert_eq!(config.retry.max_attempts, 5);
    // Untouched keys keep their defaults
    assert_eq!(config.retry.base_delay_ms, 2000);
    assert_eq!(config.storage.raw_dir, "./data/raw");
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("harvester.toml");
    fs::write(&path, "[mailbox]\nsenders = [\"nobody\"]\n").unwrap();

    assert!(AppConfig::load_from(Some(&path)).is_err());
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(AppConfig::load_from(Some(&dir.path().join("absent.toml"))).is_err());
}
