//! Error types for the job-alert-harvester library.
//!
//! `HarvestError` covers everything the pipeline can surface. Mailbox calls
//! return `MailboxError`, which carries an [`ErrorKind`] so the retry wrapper
//! can decide on the kind instead of inspecting error text.

use thiserror::Error;

/// How a failed mailbox call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient error - will retry if attempts remain
    Transient,
    /// Permanent error - will not retry
    Permanent,
    /// Credentials were rejected or could not be refreshed
    Auth,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    #[must_use]
    pub const fn should_retry(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// A failed call against the mailbox collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} mailbox error during {operation}: {message}")]
pub struct MailboxError {
    /// Retry classification
    pub kind: ErrorKind,
    /// Mailbox operation that failed (`list_unread`, `get`, ...)
    pub operation: String,
    /// Human readable cause
    pub message: String,
}

impl MailboxError {
    pub fn transient(operation: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn permanent(operation: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn auth(operation: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Auth,
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self.kind, ErrorKind::Auth)
    }
}

/// Errors that can occur while harvesting job alerts.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Mailbox call failed after retries
    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    /// Authentication could not be established for this tick
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read or write errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// No period dataset exists yet
    #[error("No period dataset found in {0}")]
    NoPeriodData(String),

    /// The fetched message cannot be processed (no HTML part, no date, ...)
    #[error("Malformed message {id}: {reason}")]
    MalformedMessage {
        /// Mailbox message id
        id: String,
        /// What was missing or broken
        reason: String,
    },

    /// Another harvester already holds the instance lock
    #[error("Another harvester instance holds the lock at {0}")]
    AlreadyRunning(String),
}

/// Convenience type alias for Result with HarvestError
pub type Result<T> = std::result::Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_retry() {
        assert!(ErrorKind::Transient.should_retry());
        assert!(!ErrorKind::Permanent.should_retry());
        assert!(!ErrorKind::Auth.should_retry());
    }

    #[test]
    fn mailbox_error_display_names_operation() {
        let err = MailboxError::transient("list_unread", "HTTP 503");
        assert_eq!(err.to_string(), "Transient mailbox error during list_unread: HTTP 503");
    }
}
