//! Retry with exponential backoff and per-call timeouts.
//!
//! Only `SearchIndexError::BackendUnavailable` is retried; every other error is
//! returned on the first attempt. Timeouts are reported as `BackendUnavailable`
//! so they go through the same retry budget.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{info, warn};

use crate::errors::SearchIndexError;

/// Configuration for operation retry behavior.
///
/// The n-th retry waits `factor * base_millis^n` milliseconds, capped at
/// `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Base of the exponential backoff, in milliseconds.
    pub base_millis: u64,
    /// Multiplier applied to every delay.
    pub factor: u64,
    pub max_delay: Duration,
    /// Total attempts, including the first one. Must be at least 1.
    pub max_attempts: usize,
    /// Randomize each delay between zero and its computed value.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::sync()
    }
}

impl RetryConfig {
    /// Retry for sync writes: 5 attempts starting at 200ms, backoff capped at 5 seconds.
    #[must_use]
    pub fn sync() -> Self {
        Self {
            base_millis: 2,
            factor: 100,
            max_delay: Duration::from_secs(5),
            max_attempts: 5,
            jitter: true,
        }
    }

    /// Quick retry for queries: 3 attempts starting at 100ms, then let the caller handle it.
    #[must_use]
    pub fn query() -> Self {
        Self {
            base_millis: 2,
            factor: 50,
            max_delay: Duration::from_secs(2),
            max_attempts: 3,
            jitter: true,
        }
    }

    /// A single attempt.
    #[must_use]
    pub fn none() -> Self {
        Self {
            base_millis: 1,
            factor: 0,
            max_delay: Duration::ZERO,
            max_attempts: 1,
            jitter: false,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// The delays between attempts, one per retry.
    pub fn strategy(&self) -> impl Iterator<Item = Duration> {
        let jittered = self.jitter;
        ExponentialBackoff::from_millis(self.base_millis)
            .factor(self.factor)
            .max_delay(self.max_delay)
            .map(move |delay| if jittered { jitter(delay) } else { delay })
            .take(self.max_attempts.max(1) - 1)
    }
}

/// Run an async operation with a deadline, mapping expiry to `BackendUnavailable`.
pub async fn with_timeout<T, Fut>(
    operation_name: &str,
    deadline: Duration,
    operation: Fut,
) -> Result<T, SearchIndexError>
where
    Fut: Future<Output = Result<T, SearchIndexError>>,
{
    match timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(SearchIndexError::unavailable(format!(
            "'{}' timed out after {:?}",
            operation_name, deadline
        ))),
    }
}

/// Retry an operation while it fails with a retryable error.
///
/// # Arguments
///
/// * `operation_name` - Name used in log messages
/// * `config` - Backoff parameters and attempt budget
/// * `operation` - Produces one attempt per call
///
/// # Returns
///
/// The first success, the first non-retryable error, or the last error once
/// the attempt budget is spent.
pub async fn retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, SearchIndexError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SearchIndexError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0usize;

    let result = RetryIf::spawn(
        config.strategy(),
        || {
            attempts += 1;
            operation()
        },
        |err: &SearchIndexError| {
            let retryable = err.is_retryable();
            if retryable {
                warn!(
                    operation = operation_name,
                    max_attempts = max_attempts,
                    error = %err,
                    "Operation failed with a retryable error"
                );
            }
            retryable
        },
    )
    .await;

    if result.is_ok() && attempts > 1 {
        info!(
            operation = operation_name,
            attempts = attempts,
            "Operation succeeded after retry"
        );
    }
    result
}

/// `retry` where every attempt is bounded by `deadline`.
pub async fn retry_with_timeout<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    deadline: Duration,
    mut operation: F,
) -> Result<T, SearchIndexError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SearchIndexError>>,
{
    retry(operation_name, config, || {
        with_timeout(operation_name, deadline, operation())
    })
    .await
}
