use anyhow::{anyhow, Result};
use std::path::Path;

/// Longest subject prefix kept in capture file names.
pub const SUBJECT_FILE_CHARS: usize = 30;

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate email format
    pub fn validate_email(email: &str) -> Result<()> {
        if email.trim().is_empty() {
            return Err(anyhow!("Email cannot be empty"));
        }

        if email.len() > 254 {
            return Err(anyhow!("Email too long (max 254 characters)"));
        }

        // Basic email validation
        if !email.contains('@') {
            return Err(anyhow!("Email must contain @ symbol"));
        }

        let parts: Vec<&str> = email.split('@').collect();
        if parts.len() != 2 {
            return Err(anyhow!("Email must have exactly one @ symbol"));
        }

        let local_part = parts[0];
        let domain_part = parts[1];

        if local_part.is_empty() || local_part.len() > 64 {
            return Err(anyhow!("Email local part invalid"));
        }

        if domain_part.is_empty() || !domain_part.contains('.') {
            return Err(anyhow!("Email domain invalid"));
        }

        // Senders end up inside a Gmail search query
        if email.chars().any(|c| c.is_whitespace() || c == '(' || c == ')') {
            return Err(anyhow!("Email contains invalid characters"));
        }

        Ok(())
    }

    /// Validate the list of alert senders to poll for
    pub fn validate_senders(senders: &[String]) -> Result<()> {
        if senders.is_empty() {
            return Err(anyhow!("At least one sender must be configured"));
        }

        for sender in senders {
            Self::validate_email(sender).map_err(|e| anyhow!("Invalid sender {sender}: {e}"))?;
        }

        Ok(())
    }

    /// Validate a storage directory setting
    pub fn validate_directory(path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        if path_str.trim().is_empty() {
            return Err(anyhow!("Directory path cannot be empty"));
        }

        if path_str.contains('\0') {
            return Err(anyhow!("Directory path contains invalid characters"));
        }

        // Check path length
        if path_str.len() > 4096 {
            return Err(anyhow!("Directory path too long (max 4096 characters)"));
        }

        if path.is_file() {
            return Err(anyhow!("Directory path points at a file: {path:?}"));
        }

        Ok(())
    }

    /// Validate the polling interval in seconds
    pub fn validate_poll_interval(secs: u64) -> Result<()> {
        if secs == 0 {
            return Err(anyhow!("Poll interval must be greater than 0"));
        }

        if secs > 24 * 60 * 60 {
            return Err(anyhow!("Poll interval too large (max one day)"));
        }

        Ok(())
    }

    /// Validate retry attempts for mailbox calls
    pub fn validate_retry_attempts(attempts: u32) -> Result<()> {
        if attempts == 0 {
            return Err(anyhow!("Retry attempts must be greater than 0"));
        }

        if attempts > 10 {
            return Err(anyhow!("Retry attempts too large (max 10)"));
        }

        Ok(())
    }

    /// Reduce a subject to a file-name-safe prefix.
    ///
    /// Keeps the first 30 characters, then drops anything that is not
    /// alphanumeric, a space, `_` or `-`.
    #[must_use]
    pub fn sanitize_subject(subject: &str) -> String {
        subject
            .chars()
            .take(SUBJECT_FILE_CHARS)
            .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Keep only characters that are safe in a single path component.
    #[must_use]
    pub fn sanitize_file_component(text: &str) -> String {
        text.chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
            .collect()
    }

    /// Strip characters that would break an RFC 822 header line.
    #[must_use]
    pub fn sanitize_header(text: &str) -> String {
        text.chars().filter(|c| !c.is_control()).collect::<String>().trim().to_string()
    }
}
