//! Tracing initialization for hosts embedding the sync engine.

use std::env;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::SyncError;

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "search_sync=info,search_sync_repository=info";

/// Install the global tracing subscriber.
///
/// Uses `RUST_LOG` when set. Output is JSON when `SEARCH_SYNC_LOG_JSON` is set,
/// pretty console output otherwise.
///
/// # Returns
///
/// * `Ok(())` - The subscriber is installed
/// * `Err(SyncError::ConfigError)` - If a global subscriber was already set
pub fn init_tracing() -> Result<(), SyncError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if env::var("SEARCH_SYNC_LOG_JSON").is_ok() {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
            .map_err(|e| SyncError::config(format!("Failed to initialize tracing: {}", e)))?;

        info!(
            service_name = "search-sync",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with JSON format"
        );
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .try_init()
            .map_err(|e| SyncError::config(format!("Failed to initialize tracing: {}", e)))?;

        info!(
            service_name = "search-sync",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with console output"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let first = init_tracing();
        let second = init_tracing();

        // Another test binary may have installed a subscriber first.
        assert!(first.is_ok() || first.unwrap_err().is_configuration());
        assert!(second.unwrap_err().is_configuration());
    }
}
