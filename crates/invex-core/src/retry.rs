//! Capped exponential backoff with jitter for transient remote failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::StatusCode;
use crate::models::config::RetryConfig;

/// Retry policy keyed on status codes.
///
/// Failures whose status is not in the retryable set propagate immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    pre_delay: Duration,
    retryable_statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            pre_delay: Duration::ZERO,
            retryable_statuses: vec![403, 429, 500, 503],
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts)
            .with_base_delay(Duration::from_millis(config.base_delay_ms))
            .with_max_delay(Duration::from_millis(config.max_delay_ms))
            .with_pre_delay(Duration::from_millis(config.pre_delay_ms))
            .with_retryable_statuses(config.retryable_statuses.clone())
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Fixed pause before every attempt.
    pub fn with_pre_delay(mut self, delay: Duration) -> Self {
        self.pre_delay = delay;
        self
    }

    pub fn with_retryable_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.retryable_statuses = statuses;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_retryable<E: StatusCode>(&self, error: &E) -> bool {
        error
            .status_code()
            .is_some_and(|status| self.retryable_statuses.contains(&status))
    }

    /// Wait after the given zero-based failed attempt: `base * 2^attempt`,
    /// capped, plus up to one `base` of jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        let base_ms = self.base_delay.as_millis() as u64;
        let jitter = if base_ms == 0 { 0 } else { fastrand::u64(0..=base_ms) };
        exponential + Duration::from_millis(jitter)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StatusCode + Display,
    {
        let mut attempt = 0;
        loop {
            if !self.pre_delay.is_zero() {
                tokio::time::sleep(self.pre_delay).await;
            }

            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if self.is_retryable(&error) && attempt + 1 < self.max_attempts => {
                    let wait = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        error = %error,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn status(code: u16) -> SourceError {
        SourceError::Status {
            operation: "list".into(),
            status: code,
            message: "boom".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(8);

        let result: Result<&str, SourceError> = policy
            .run("list", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(status(429))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(8);

        let result: Result<(), SourceError> = policy
            .run("download", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(status(404))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3);

        let result: Result<(), SourceError> = policy
            .run("move", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(status(503))
            })
            .await;

        assert!(matches!(result, Err(SourceError::Status { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(8)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));

        let first = policy.delay_for(0);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(200));

        let late = policy.delay_for(10);
        assert!(late >= Duration::from_millis(500) && late <= Duration::from_millis(600));
    }
}
