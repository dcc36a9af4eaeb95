//! Dependency initialization and wiring for the sync engine.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use search_sync_repository::{
    EmbeddedBackend, IndexBackend, IndexConfig, IndexRegistry, OpenSearchBackend,
    SearchIndexService,
};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::SyncEngineConfig;
use crate::engine::SyncEngine;
use crate::errors::SyncError;
use crate::listener::{CommitListener, ListenerConfig};
use crate::record_store::{CommitFeed, RecordStore};

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Default base directory of the embedded indices.
const DEFAULT_EMBEDDED_INDEX_DIR: &str = "search_index";

/// Which index technology backs the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process inverted index.
    Embedded,
    /// Remote OpenSearch cluster.
    OpenSearch,
}

impl BackendKind {
    /// Parse a backend name: "embedded" or "opensearch" (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "embedded" | "memory" => Some(Self::Embedded),
            "opensearch" | "open-search" => Some(Self::OpenSearch),
            _ => None,
        }
    }

    /// Read `SEARCH_BACKEND`. Defaults to "embedded" if not set.
    fn from_env() -> Result<Self, SyncError> {
        match env::var("SEARCH_BACKEND") {
            Ok(value) => Self::parse(&value).ok_or_else(|| {
                SyncError::config(format!("Unknown SEARCH_BACKEND '{}'", value))
            }),
            Err(_) => Ok(Self::Embedded),
        }
    }
}

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry the connection at a fixed interval until it succeeds.
    Retry,
}

impl ConnectionMode {
    /// Parse a connection mode: "fail-fast" or "retry" (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Some(Self::FailFast),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }

    /// Read `OPENSEARCH_CONNECTION_MODE`. Defaults to "retry" if not set or invalid.
    fn from_env() -> Self {
        let value =
            env::var("OPENSEARCH_CONNECTION_MODE").unwrap_or_else(|_| "retry".to_string());
        Self::parse(&value).unwrap_or_else(|| {
            warn!("Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
            Self::Retry
        })
    }
}

/// Container for all initialized dependencies.
///
/// The engine, the query service and the listener share one `IndexRegistry`,
/// so every component sees the same index per entity kind.
pub struct Dependencies {
    pub registry: Arc<IndexRegistry>,
    pub engine: Arc<SyncEngine>,
    pub search: SearchIndexService,
    /// Not started; spawn `run` to begin consuming commit events.
    pub listener: Arc<CommitListener>,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// Loads a `.env` file first if one is present.
    ///
    /// # Environment Variables
    ///
    /// - `SEARCH_BACKEND`: "embedded" or "opensearch" (default: embedded)
    /// - `SEARCH_INDEX_DIR`: Base directory of the embedded indices (default: search_index)
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `SEARCH_INDEX_PREFIX`: Prefix for OpenSearch index names (default: none)
    /// - `OPENSEARCH_CONNECTION_MODE`: Connection mode - "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    /// - the `SEARCH_SYNC_*` variables read by [`SyncEngineConfig::from_env`] and
    ///   [`ListenerConfig::from_env`]
    ///
    /// # Arguments
    ///
    /// * `store` - The host's record store
    /// * `feed` - The host's commit notifications
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(SyncError)` - If configuration is invalid or the connection fails in
    ///   fail-fast mode
    pub async fn new(
        store: Arc<dyn RecordStore>,
        feed: Arc<dyn CommitFeed>,
    ) -> Result<Self, SyncError> {
        dotenv().ok();

        let config = SyncEngineConfig::from_env()?;
        let listener_config = ListenerConfig::from_env()?;
        let backend_kind = BackendKind::from_env()?;

        let backend: Arc<dyn IndexBackend> = match backend_kind {
            BackendKind::Embedded => {
                let index_dir = env::var("SEARCH_INDEX_DIR")
                    .unwrap_or_else(|_| DEFAULT_EMBEDDED_INDEX_DIR.to_string());
                info!(
                    backend = ?backend_kind,
                    index_dir = %index_dir,
                    "Initializing dependencies"
                );
                Arc::new(EmbeddedBackend::new(index_dir))
            }
            BackendKind::OpenSearch => {
                let opensearch_url = env::var("OPENSEARCH_URL")
                    .unwrap_or_else(|_| DEFAULT_OPENSEARCH_URL.to_string());
                let index_prefix = env::var("SEARCH_INDEX_PREFIX").unwrap_or_default();
                let connection_mode = ConnectionMode::from_env();
                let retry_interval = env::var("OPENSEARCH_RETRY_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_INTERVAL_SECS);

                info!(
                    backend = ?backend_kind,
                    opensearch_url = %opensearch_url,
                    index_prefix = %index_prefix,
                    connection_mode = ?connection_mode,
                    retry_interval_secs = retry_interval,
                    "Initializing dependencies"
                );

                let backend = Self::connect_to_opensearch(
                    &opensearch_url,
                    IndexConfig::new(index_prefix),
                    connection_mode,
                    Duration::from_secs(retry_interval),
                )
                .await?;

                info!("OpenSearch connection established");
                Arc::new(backend)
            }
        };

        Ok(Self::with_backend(
            backend,
            store,
            feed,
            config,
            listener_config,
        ))
    }

    /// Wire the components around an already constructed backend.
    pub fn with_backend(
        backend: Arc<dyn IndexBackend>,
        store: Arc<dyn RecordStore>,
        feed: Arc<dyn CommitFeed>,
        config: SyncEngineConfig,
        listener_config: ListenerConfig,
    ) -> Self {
        let registry = Arc::new(IndexRegistry::new(backend));
        let engine = Arc::new(SyncEngine::with_config(registry.clone(), store, config));
        let search = SearchIndexService::new(registry.clone());
        let listener = Arc::new(CommitListener::with_config(
            engine.clone(),
            feed,
            listener_config,
        ));

        Self {
            registry,
            engine,
            search,
            listener,
        }
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        url: &str,
        index_config: IndexConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchBackend, SyncError> {
        loop {
            match Self::try_connect_opensearch(url, index_config.clone()).await {
                Ok(backend) => return Ok(backend),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(SyncError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    /// Build the backend and check that the cluster answers.
    async fn try_connect_opensearch(
        url: &str,
        index_config: IndexConfig,
    ) -> Result<OpenSearchBackend, SyncError> {
        let backend = OpenSearchBackend::new(url, index_config).await?;
        backend.ping().await?;
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_store::MemoryRecordStore;
    use search_sync_shared::{EntityKind, MapRecord, SearchOptions, SyncOperation};

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("embedded"), Some(BackendKind::Embedded));
        assert_eq!(BackendKind::parse(" OpenSearch "), Some(BackendKind::OpenSearch));
        assert_eq!(BackendKind::parse("solr"), None);
    }

    #[test]
    fn test_connection_mode_parse() {
        assert_eq!(ConnectionMode::parse("fail-fast"), Some(ConnectionMode::FailFast));
        assert_eq!(ConnectionMode::parse("FAIL_FAST"), Some(ConnectionMode::FailFast));
        assert_eq!(ConnectionMode::parse("retry"), Some(ConnectionMode::Retry));
        assert_eq!(ConnectionMode::parse("sometimes"), None);
    }

    #[tokio::test]
    async fn test_fail_fast_reports_invalid_url() {
        let result = Dependencies::connect_to_opensearch(
            "not a url",
            IndexConfig::default(),
            ConnectionMode::FailFast,
            Duration::from_millis(1),
        )
        .await;

        assert!(matches!(result, Err(SyncError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_components_share_registry() {
        let store = Arc::new(MemoryRecordStore::new());
        let deps = Dependencies::with_backend(
            Arc::new(EmbeddedBackend::in_memory()),
            store.clone(),
            store.clone(),
            SyncEngineConfig::default(),
            ListenerConfig::default(),
        );

        let kind = EntityKind::new("article").with_text_field("title");
        let record = MapRecord::new("article")
            .with_value("id", 1)
            .with_value("title", "shared registry");
        deps.engine
            .sync_on_commit(&kind, &record, SyncOperation::Create)
            .await
            .unwrap();

        let ids = deps
            .search
            .search(&kind, "registry", &SearchOptions::new())
            .await
            .unwrap();

        assert_eq!(ids, vec!["1"]);
        assert_eq!(deps.registry.len().await, 1);
        assert!(Arc::ptr_eq(deps.engine.registry(), &deps.registry));
    }
}
