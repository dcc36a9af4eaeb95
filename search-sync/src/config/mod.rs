//! Configuration for the sync engine.

mod dependencies;

use std::env;
use std::str::FromStr;
use std::time::Duration;

use search_sync_repository::RetryConfig;

use crate::errors::SyncError;

pub use dependencies::{BackendKind, ConnectionMode, Dependencies};

/// Default number of records fetched per backfill page.
const DEFAULT_PAGE_SIZE: usize = 100;

/// Default deadline for a single backend call.
const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Records fetched per backfill page.
    pub page_size: usize,
    /// Deadline for each backend call. Expiry is retried like an unavailable backend.
    pub operation_timeout: Duration,
    /// Retry policy for unavailable backends.
    pub retry: RetryConfig,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
            retry: RetryConfig::sync(),
        }
    }
}

pub(crate) fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>, SyncError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SyncError::config(format!("Invalid value '{}' for {}", raw, name))),
        Err(_) => Ok(None),
    }
}

impl SyncEngineConfig {
    /// Read the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SEARCH_SYNC_PAGE_SIZE`: Backfill page size (default: 100)
    /// - `SEARCH_SYNC_TIMEOUT_SECS`: Per-call backend timeout (default: 30)
    /// - `SEARCH_SYNC_MAX_RETRIES`: Attempts per backend call (default: 5)
    ///
    /// # Returns
    ///
    /// * `Ok(SyncEngineConfig)` - The validated configuration
    /// * `Err(SyncError::ConfigError)` - If a variable is set but invalid
    pub fn from_env() -> Result<Self, SyncError> {
        let mut config = Self::default();

        if let Some(page_size) = parse_env::<usize>("SEARCH_SYNC_PAGE_SIZE")? {
            config.page_size = page_size;
        }
        if let Some(secs) = parse_env::<u64>("SEARCH_SYNC_TIMEOUT_SECS")? {
            config.operation_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_env::<usize>("SEARCH_SYNC_MAX_RETRIES")? {
            config.retry = config.retry.with_max_attempts(attempts);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.page_size == 0 {
            return Err(SyncError::config("Page size must be greater than zero"));
        }
        if self.operation_timeout.is_zero() {
            return Err(SyncError::config("Operation timeout must be greater than zero"));
        }
        Ok(())
    }
}
