//! Rate-check algorithm - allow/deny decisions on top of the counter store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::CounterStoreError;
use crate::ports::CounterStore;

/// Outcome of a rate limit check.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left before the limit is hit. Never negative.
    pub remaining: i64,
    /// When the current window is expected to reset.
    pub reset_at: DateTime<Utc>,
    pub limit: i64,
}

/// Turns raw counter increments into rate limit decisions.
///
/// Holds the store as an explicit dependency; callers that share one limiter
/// across tasks wrap it in an `Arc` or clone it.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Count one hit against `key` and decide whether it stays within `limit`.
    ///
    /// `reset_at` is computed as `now + window` rather than read back from
    /// the backend's stored expiry, so it can drift from the true reset time
    /// when the same key is checked with different window durations. Callers
    /// that need the exact stored expiry can read it via `CounterStore::get`.
    pub async fn check(
        &self,
        key: &str,
        limit: i64,
        window: Duration,
    ) -> Result<RateLimitDecision, CounterStoreError> {
        let count = self.store.increment(key, window).await?;

        Ok(RateLimitDecision {
            allowed: count <= limit,
            remaining: (limit - count).max(0),
            reset_at: Utc::now() + window,
            limit,
        })
    }

    /// The underlying store, for callers that need direct counter access.
    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::CounterEntry;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Minimal in-process store for exercising the algorithm.
    #[derive(Default)]
    struct StubStore {
        counts: Mutex<HashMap<String, i64>>,
    }

    #[async_trait]
    impl CounterStore for StubStore {
        async fn get(&self, key: &str) -> Result<Option<CounterEntry>, CounterStoreError> {
            let counts = self.counts.lock().unwrap();
            Ok(counts.get(key).map(|&count| CounterEntry {
                count,
                expires_at: Utc::now(),
            }))
        }

        async fn increment(
            &self,
            key: &str,
            _window: Duration,
        ) -> Result<i64, CounterStoreError> {
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(key.to_string()).or_insert(0);
            *count += 1;
            Ok(*count)
        }

        async fn reset(&self, key: &str) -> Result<(), CounterStoreError> {
            self.counts.lock().unwrap().remove(key);
            Ok(())
        }

        async fn close(&self) -> Result<(), CounterStoreError> {
            Ok(())
        }
    }

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(StubStore::default()))
    }

    #[tokio::test]
    async fn test_allow_deny_boundary() {
        let limiter = limiter();
        let window = Duration::from_secs(60);

        // Calls 1-5 are allowed with limit 5.
        for call in 1..=5 {
            let decision = limiter.check("user:1", 5, window).await.unwrap();
            assert!(decision.allowed, "call {call} should be allowed");
            assert_eq!(decision.remaining, 5 - call);
            assert_eq!(decision.limit, 5);
        }

        // Call 6 is denied with nothing remaining.
        let decision = limiter.check("user:1", 5, window).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn test_remaining_never_negative() {
        let limiter = limiter();
        let window = Duration::from_secs(60);

        for _ in 0..20 {
            let decision = limiter.check("user:2", 3, window).await.unwrap();
            assert!(decision.remaining >= 0);
        }
    }

    #[tokio::test]
    async fn test_reset_at_is_in_the_future() {
        let limiter = limiter();
        let before = Utc::now();

        let decision = limiter
            .check("user:3", 10, Duration::from_secs(30))
            .await
            .unwrap();

        assert!(decision.reset_at >= before + Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter();
        let window = Duration::from_secs(60);

        limiter.check("user:a", 1, window).await.unwrap();
        let denied = limiter.check("user:a", 1, window).await.unwrap();
        let fresh = limiter.check("user:b", 1, window).await.unwrap();

        assert!(!denied.allowed);
        assert!(fresh.allowed);
    }
}
