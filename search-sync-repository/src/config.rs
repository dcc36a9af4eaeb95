//! Configuration types for the SearchIndexService.

use std::time::Duration;

use crate::retry::RetryConfig;

/// Default deadline for a single query attempt.
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the SearchIndexService.
///
/// Controls how long a query may take and how unavailable backends are retried.
#[derive(Debug, Clone)]
pub struct SearchIndexServiceConfig {
    /// Deadline for each query attempt. Expiry counts as a retryable failure.
    pub query_timeout: Duration,

    /// Retry policy for `BackendUnavailable` failures.
    pub retry: RetryConfig,
}

impl Default for SearchIndexServiceConfig {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            retry: RetryConfig::query(),
        }
    }
}

impl SearchIndexServiceConfig {
    /// Create a config that makes a single attempt per query.
    ///
    /// # Returns
    ///
    /// A `SearchIndexServiceConfig` with retries disabled and the default timeout.
    pub fn no_retry() -> Self {
        Self {
            retry: RetryConfig::none(),
            ..Self::default()
        }
    }

    /// Set the per-attempt query timeout.
    ///
    /// # Arguments
    ///
    /// * `query_timeout` - Deadline for each query attempt
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SearchIndexServiceConfig::default();
        assert_eq!(config.query_timeout, Duration::from_secs(10));
        assert_eq!(config.retry, RetryConfig::query());
        assert_eq!(SearchIndexServiceConfig::no_retry().retry.max_attempts, 1);
    }
}
