//! Commit listener.
//!
//! Subscribes one channel to the record store's commit feed and routes each
//! `SyncEvent` through the sync engine exactly once. Sync failures are logged
//! and counted; they never reach the record store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use search_sync_shared::SyncEvent;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::parse_env;
use crate::engine::SyncEngine;
use crate::errors::SyncError;
use crate::record_store::CommitFeed;

/// Configuration for the commit listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Size of the event channel handed to the commit feed.
    pub channel_buffer_size: usize,
    /// How often progress is logged.
    pub progress_interval: Duration,
    /// Stop on Ctrl+C in addition to `shutdown`.
    pub stop_on_ctrl_c: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
            progress_interval: Duration::from_secs(10),
            stop_on_ctrl_c: false,
        }
    }
}

impl ListenerConfig {
    /// Read the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SEARCH_SYNC_CHANNEL_BUFFER`: Commit event channel size (default: 1000)
    /// - `SEARCH_SYNC_PROGRESS_INTERVAL_SECS`: Progress log interval (default: 10)
    ///
    /// # Returns
    ///
    /// * `Ok(ListenerConfig)` - The validated configuration
    /// * `Err(SyncError::ConfigError)` - If a variable is set but invalid
    pub fn from_env() -> Result<Self, SyncError> {
        let mut config = Self::default();

        if let Some(size) = parse_env::<usize>("SEARCH_SYNC_CHANNEL_BUFFER")? {
            config.channel_buffer_size = size;
        }
        if let Some(secs) = parse_env::<u64>("SEARCH_SYNC_PROGRESS_INTERVAL_SECS")? {
            config.progress_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.channel_buffer_size == 0 {
            return Err(SyncError::config(
                "Channel buffer size must be greater than zero",
            ));
        }
        if self.progress_interval.is_zero() {
            return Err(SyncError::config(
                "Progress interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Event counters since the listener was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub processed: u64,
    pub failed: u64,
}

/// Listener that mirrors commit events into the search index.
///
/// `run` consumes events until `shutdown` is called, the feed closes the
/// channel, or (when configured) Ctrl+C is received. A listener runs at most
/// once at a time, so each event is handled by a single subscription.
pub struct CommitListener {
    engine: Arc<SyncEngine>,
    feed: Arc<dyn CommitFeed>,
    config: ListenerConfig,
    shutdown_tx: broadcast::Sender<()>,
    stopping: AtomicBool,
    running: AtomicBool,
    /// Events synced without error.
    processed: AtomicU64,
    /// Events whose sync failed and was given up on.
    failed: AtomicU64,
}

impl CommitListener {
    /// Create a new listener with default configuration.
    pub fn new(engine: Arc<SyncEngine>, feed: Arc<dyn CommitFeed>) -> Self {
        Self::with_config(engine, feed, ListenerConfig::default())
    }

    /// Create a new listener with custom configuration.
    pub fn with_config(
        engine: Arc<SyncEngine>,
        feed: Arc<dyn CommitFeed>,
        config: ListenerConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            engine,
            feed,
            config,
            shutdown_tx,
            stopping: AtomicBool::new(false),
            running: AtomicBool::new(false),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Run the listener.
    ///
    /// Blocks until a shutdown signal is received or the feed closes the
    /// channel. Events already buffered when the loop stops are still synced.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - After the subscription was removed and buffered events drained
    /// * `Err(SyncError)` - If the configuration is invalid, the listener is
    ///   already running or the feed refused the subscription
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), SyncError> {
        self.config.validate()?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SyncError::config("Commit listener is already running"));
        }
        let result = self.listen().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn listen(&self) -> Result<(), SyncError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let (event_tx, mut event_rx) =
            mpsc::channel::<SyncEvent>(self.config.channel_buffer_size);
        let subscription = self.feed.subscribe(event_tx).await?;

        info!(subscription = %subscription, "Commit listener started");

        let mut progress_timer = interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut prev_processed: u64 = 0;
        let mut prev_time = Instant::now();

        // A shutdown requested before the broadcast subscription existed.
        let mut stop = self.stopping.load(Ordering::SeqCst);

        while !stop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => self.process(&event).await,
                        None => {
                            info!("Commit feed closed the channel");
                            stop = true;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    stop = true;
                }
                _ = tokio::signal::ctrl_c(), if self.config.stop_on_ctrl_c => {
                    info!("Received Ctrl+C");
                    stop = true;
                }
                _ = progress_timer.tick() => {
                    let stats = self.stats();

                    let now = Instant::now();
                    let elapsed_secs = now.duration_since(prev_time).as_secs_f64();
                    let events_per_sec = if elapsed_secs > 0.0 {
                        (stats.processed.saturating_sub(prev_processed) as f64) / elapsed_secs
                    } else {
                        0.0
                    };

                    info!(
                        events_processed = stats.processed,
                        events_failed = stats.failed,
                        events_per_sec = format!("{:.2}", events_per_sec),
                        "Sync progress"
                    );

                    prev_processed = stats.processed;
                    prev_time = now;
                }
            }
        }

        // Close first so a feed blocked on a full channel is released.
        event_rx.close();
        if let Err(e) = self.feed.unsubscribe(subscription).await {
            warn!(subscription = %subscription, error = %e, "Failed to unsubscribe from commit feed");
        }
        while let Ok(event) = event_rx.try_recv() {
            self.process(&event).await;
        }

        let stats = self.stats();
        info!(
            total_events_processed = stats.processed,
            total_events_failed = stats.failed,
            "Commit listener stopped"
        );
        Ok(())
    }

    async fn process(&self, event: &SyncEvent) {
        let lag_ms = Utc::now()
            .signed_duration_since(event.committed_at)
            .num_milliseconds();

        match self.engine.handle_event(event).await {
            Ok(outcome) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    event_id = %event.event_id,
                    entity_kind = %event.entity_kind(),
                    operation = %event.operation,
                    outcome = ?outcome,
                    lag_ms,
                    "Commit event synced"
                );
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    event_id = %event.event_id,
                    entity_kind = %event.entity_kind(),
                    operation = %event.operation,
                    error = %e,
                    "Failed to sync commit event"
                );
            }
        }
    }

    /// Trigger a graceful shutdown. A listener that was shut down does not run again.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    pub fn stats(&self) -> ListenerStats {
        ListenerStats {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
