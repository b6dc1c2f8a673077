//! In-memory counter store - single-process counters behind a RwLock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

use quota_core::error::CounterStoreError;
use quota_core::ports::{CounterEntry, CounterStore};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// In-memory store configuration.
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// How often the background sweep removes expired entries.
    /// A zero interval falls back to the 10 minute default.
    pub sweep_interval: Duration,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl MemoryStoreConfig {
    pub fn from_env() -> Self {
        Self {
            sweep_interval: Duration::from_secs(
                std::env::var("RATE_LIMIT_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

/// Single-process counter store backed by a HashMap.
///
/// This is the default backend with zero external dependencies. Counts are
/// exact under concurrent tasks within one process, but cannot coordinate
/// across instances - use the Postgres or Redis backend for that.
///
/// A background task sweeps expired entries on a fixed interval to bound
/// memory growth from abandoned keys; expired entries are also treated as
/// absent on read, so the sweep is purely about reclamation.
pub struct MemoryCounterStore {
    entries: Arc<RwLock<HashMap<String, CounterEntry>>>,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryCounterStore {
    /// Create the store and spawn its sweep task.
    /// Must be called from within a Tokio runtime.
    pub fn new(config: MemoryStoreConfig) -> Self {
        let sweep_interval = if config.sweep_interval.is_zero() {
            DEFAULT_SWEEP_INTERVAL
        } else {
            config.sweep_interval
        };

        let entries = Arc::new(RwLock::new(HashMap::<String, CounterEntry>::new()));
        let (shutdown, mut stop) = watch::channel(false);

        let sweep_entries = entries.clone();
        let sweeper = tokio::spawn(async move {
            let mut tick = tokio::time::interval(sweep_interval);
            // The first tick completes immediately; skip it.
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let now = Utc::now();
                        let mut entries = sweep_entries.write().await;
                        let before = entries.len();
                        entries.retain(|_, entry| entry.expires_at > now);
                        let removed = before - entries.len();
                        if removed > 0 {
                            tracing::debug!(removed, "Swept expired counters");
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
        });

        Self {
            entries,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    pub fn from_env() -> Self {
        Self::new(MemoryStoreConfig::from_env())
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<CounterEntry>, CounterStoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .copied()
            .filter(|entry| entry.expires_at > Utc::now()))
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<i64, CounterStoreError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(key) {
            if entry.expires_at > now {
                entry.count += 1;
                return Ok(entry.count);
            }
            // Expired: start a fresh window in place.
            *entry = CounterEntry {
                count: 1,
                expires_at: now + window,
            };
            return Ok(1);
        }

        entries.insert(
            key.to_string(),
            CounterEntry {
                count: 1,
                expires_at: now + window,
            },
        );
        Ok(1)
    }

    async fn reset(&self, key: &str) -> Result<(), CounterStoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), CounterStoreError> {
        let _ = self.shutdown.send(true);

        if let Some(handle) = self.sweeper.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Sweep task did not shut down cleanly");
            }
        }

        Ok(())
    }
}
