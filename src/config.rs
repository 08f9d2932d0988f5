use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::validation::InputValidator;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub mailbox: MailboxConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Alert senders to poll for
    pub senders: Vec<String>,
    /// Receives a notification for every quarantined email
    pub error_recipient: String,
    pub poll_interval_secs: u64,
    pub poll_jitter_ms: u64,
    /// Gmail REST base, up to and including `users/me`
    pub api_base_url: String,
    /// OAuth token file holding the refresh token
    pub token_path: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub raw_dir: String,
    pub processed_dir: String,
    pub emails_dir: String,
    pub failed_dir: String,
    pub flagged_dir: String,
    /// Single-instance lock file
    pub lock_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mailbox: MailboxConfig {
                senders: vec!["alert@indeed.com".to_string()],
                error_recipient: "admin@example.com".to_string(),
                poll_interval_secs: 10,
                poll_jitter_ms: 500,
                api_base_url: "https://gmail.googleapis.com/gmail/v1/users/me".to_string(),
                token_path: ".secrets/token.json".to_string(),
                request_timeout_secs: 30,
            },
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 2000,
                max_delay_ms: 30_000,
            },
            storage: StorageConfig {
                raw_dir: "./data/raw".to_string(),
                processed_dir: "./data/pre_processed".to_string(),
                emails_dir: "./data/emails".to_string(),
                failed_dir: "./data/failed_emails".to_string(),
                flagged_dir: "./log/flagged_html_files".to_string(),
                lock_path: "./data/.harvester.lock".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, optionally layering an explicit file over the defaults
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        // Start with default values
        for (key, value) in AppConfig::default() {
            builder = builder.set_default(key, value)?;
        }

        // Add config files if they exist
        builder = builder
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // Add environment variables with prefix, e.g. JOB_ALERTS_MAILBOX__SENDERS=a@x.com,b@y.com
        let config = builder
            .add_source(
                Environment::with_prefix("JOB_ALERTS")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("mailbox.senders")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate mailbox config
        InputValidator::validate_senders(&self.mailbox.senders)?;
        InputValidator::validate_email(&self.mailbox.error_recipient)
            .map_err(|e| anyhow::anyhow!("Invalid error_recipient: {}", e))?;
        InputValidator::validate_poll_interval(self.mailbox.poll_interval_secs)?;
        if self.mailbox.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("request_timeout_secs must be greater than 0"));
        }
        if !self.mailbox.api_base_url.starts_with("http://") && !self.mailbox.api_base_url.starts_with("https://") {
            return Err(anyhow::anyhow!("api_base_url must be an http(s) URL"));
        }

        // Validate retry config
        InputValidator::validate_retry_attempts(self.retry.max_attempts)?;
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(anyhow::anyhow!("max_delay_ms must not be smaller than base_delay_ms"));
        }

        // Validate storage config
        for dir in [
            &self.storage.raw_dir,
            &self.storage.processed_dir,
            &self.storage.emails_dir,
            &self.storage.failed_dir,
            &self.storage.flagged_dir,
        ] {
            InputValidator::validate_directory(Path::new(dir))?;
        }
        if self.storage.raw_dir == self.storage.processed_dir {
            return Err(anyhow::anyhow!("raw_dir and processed_dir must differ"));
        }
        if self.storage.lock_path.trim().is_empty() {
            return Err(anyhow::anyhow!("lock_path cannot be empty"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        Ok(())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }

    /// Get the token file path from environment or config
    pub fn get_token_path(&self) -> PathBuf {
        std::env::var("GMAIL_TOKEN_PATH")
            .map_or_else(|_| PathBuf::from(&self.mailbox.token_path), PathBuf::from)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.mailbox.poll_interval_secs)
    }

    pub fn poll_jitter(&self) -> Duration {
        Duration::from_millis(self.mailbox.poll_jitter_ms)
    }

    /// Gmail search query for unread alerts, e.g. `(from:a OR from:b) is:unread`
    pub fn unread_query(&self) -> String {
        let senders: Vec<String> = self.mailbox.senders.iter().map(|s| format!("from:{s}")).collect();
        format!("({}) is:unread", senders.join(" OR "))
    }
}

impl IntoIterator for AppConfig {
    type Item = (String, config::Value);
    type IntoIter = std::collections::hash_map::IntoIter<String, config::Value>;

    fn into_iter(self) -> Self::IntoIter {
        let mut map = std::collections::HashMap::new();

        // Flatten the configuration into key-value pairs
        map.insert("mailbox.senders".to_string(), config::Value::from(self.mailbox.senders));
        map.insert("mailbox.error_recipient".to_string(), config::Value::from(self.mailbox.error_recipient));
        map.insert("mailbox.poll_interval_secs".to_string(), config::Value::from(self.mailbox.poll_interval_secs));
        map.insert("mailbox.poll_jitter_ms".to_string(), config::Value::from(self.mailbox.poll_jitter_ms));
        map.insert("mailbox.api_base_url".to_string(), config::Value::from(self.mailbox.api_base_url));
        map.insert("mailbox.token_path".to_string(), config::Value::from(self.mailbox.token_path));
        map.insert("mailbox.request_timeout_secs".to_string(), config::Value::from(self.mailbox.request_timeout_secs));

        map.insert("retry.max_attempts".to_string(), config::Value::from(self.retry.max_attempts));
        map.insert("retry.base_delay_ms".to_string(), config::Value::from(self.retry.base_delay_ms));
        map.insert("retry.max_delay_ms".to_string(), config::Value::from(self.retry.max_delay_ms));

        map.insert("storage.raw_dir".to_string(), config::Value::from(self.storage.raw_dir));
        map.insert("storage.processed_dir".to_string(), config::Value::from(self.storage.processed_dir));
        map.insert("storage.emails_dir".to_string(), config::Value::from(self.storage.emails_dir));
        map.insert("storage.failed_dir".to_string(), config::Value::from(self.storage.failed_dir));
        map.insert("storage.flagged_dir".to_string(), config::Value::from(self.storage.flagged_dir));
        map.insert("storage.lock_path".to_string(), config::Value::from(self.storage.lock_path));

        map.insert("logging.level".to_string(), config::Value::from(self.logging.level));
        if let Some(file_path) = self.logging.file_path {
            map.insert("logging.file_path".to_string(), config::Value::from(file_path));
        }
        map.insert("logging.format".to_string(), config::Value::from(self.logging.format));

        map.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.mailbox.senders, vec!["alert@indeed.com".to_string()]);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.mailbox.senders.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unread_query() {
        let mut config = AppConfig::default();
        config.mailbox.senders = vec!["a@x.com".to_string(), "b@y.com".to_string()];
        assert_eq!(config.unread_query(), "(from:a@x.com OR from:b@y.com) is:unread");
    }
}
