//! Exponential backoff for mailbox calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::MailboxError;
use crate::metrics::MetricsCollector;

/// Bounded exponential backoff: `base_delay`, `2 * base_delay`, ... capped at
/// `max_delay`, with up to a quarter of the delay added as jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately; used by tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn delay_with_jitter(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        let jitter_millis = u64::try_from(delay.as_millis() / 4).unwrap_or(u64::MAX);
        if jitter_millis == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_millis))
    }

    /// Runs `call` until it succeeds, fails with a non-retryable kind, or
    /// `max_attempts` calls have been made.
    pub async fn run<T, F, Fut>(&self, operation: &str, metrics: &MetricsCollector, mut call: F) -> Result<T, MailboxError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MailboxError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if error.kind.should_retry() && attempt < self.max_attempts => {
                    let delay = self.delay_with_jitter(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Transient mailbox error, retrying"
                    );
                    metrics.record_retry(operation);
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_up_to_the_limit() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run("get", &MetricsCollector::default(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(MailboxError::transient("get", "HTTP 503"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run("get", &MetricsCollector::default(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(MailboxError::permanent("get", "HTTP 404"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = RetryPolicy::immediate(3)
            .run("list_unread", &MetricsCollector::default(), move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(MailboxError::transient("list_unread", "timeout"))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
    }
}
