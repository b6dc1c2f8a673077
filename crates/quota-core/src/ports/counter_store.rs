//! Counter store port.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CounterStoreError;

/// A live counter value with its absolute expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    pub count: i64,
    pub expires_at: DateTime<Utc>,
}

/// Counter store trait - abstraction over expiring-counter backends.
///
/// Every backend honors the same contract regardless of its native atomicity
/// mechanism: `increment` is exact under unbounded concurrent callers on the
/// same key, and a counter whose window has elapsed behaves as if it never
/// existed.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value for a key. `None` if the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<CounterEntry>, CounterStoreError>;

    /// Atomically create, increment, or restart the counter for a key.
    ///
    /// Creates `{count: 1, expires_at: now + window}` on first sight of the
    /// key or when the stored entry has expired; otherwise increments the
    /// count and leaves the expiry untouched. Returns the resulting count.
    ///
    /// The window only takes effect when a new entry is created, so changing
    /// it mid-series for the same key has no effect until the key expires.
    async fn increment(&self, key: &str, window: Duration) -> Result<i64, CounterStoreError>;

    /// Remove a key unconditionally. Succeeds if the key does not exist.
    async fn reset(&self, key: &str) -> Result<(), CounterStoreError>;

    /// Release backend resources (background tasks, connections).
    /// Safe to call more than once.
    async fn close(&self) -> Result<(), CounterStoreError>;
}
