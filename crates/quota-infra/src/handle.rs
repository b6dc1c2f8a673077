//! Shared handle to the active counter store.

use std::sync::Arc;

use tokio::sync::RwLock;

use quota_core::ports::CounterStore;

use crate::memory::MemoryCounterStore;

/// Holds the active counter store for callers that do not carry an explicit
/// backend dependency.
///
/// Construct one at startup and pass it through application state rather
/// than keeping it in a global. The lock makes `set` and `get` safe to race:
/// a reader either sees the old store or the new one, and keeps whichever
/// `Arc` it resolved.
#[derive(Default)]
pub struct SharedCounterStore {
    inner: RwLock<Option<Arc<dyn CounterStore>>>,
}

impl SharedCounterStore {
    /// An empty handle; `get` installs an in-memory fallback on first use.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    pub fn with_store(store: Arc<dyn CounterStore>) -> Self {
        Self {
            inner: RwLock::new(Some(store)),
        }
    }

    /// Install a backend, closing any previously installed one.
    ///
    /// Closing the old store is best-effort: failures are logged, not
    /// returned, and callers still holding the old `Arc` may complete
    /// in-flight operations against it.
    pub async fn set(&self, store: Arc<dyn CounterStore>) {
        let previous = {
            let mut inner = self.inner.write().await;
            inner.replace(store)
        };

        if let Some(old) = previous {
            tracing::warn!("Replacing an already-installed counter store");
            if let Err(e) = old.close().await {
                tracing::warn!(error = %e, "Failed to close replaced counter store");
            }
        }
    }

    /// The active store, installing an in-memory fallback if none is set,
    /// so callers never observe an absent store.
    pub async fn get(&self) -> Arc<dyn CounterStore> {
        if let Some(store) = self.inner.read().await.as_ref() {
            return store.clone();
        }

        let mut inner = self.inner.write().await;
        // Another caller may have won the race for the write lock.
        if let Some(store) = inner.as_ref() {
            return store.clone();
        }

        tracing::warn!("No counter store installed; falling back to in-memory");
        let store: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::default());
        *inner = Some(store.clone());
        store
    }

    /// Close and drop the active store, if any.
    pub async fn close(&self) {
        let store = self.inner.write().await.take();
        if let Some(store) = store {
            if let Err(e) = store.close().await {
                tracing::warn!(error = %e, "Failed to close counter store");
            }
        }
    }
}
