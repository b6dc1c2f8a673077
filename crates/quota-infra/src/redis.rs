//! Redis counter store - atomic scripted increments in a shared keyspace.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use quota_core::error::CounterStoreError;
use quota_core::ports::{CounterEntry, CounterStore};

/// Redis store configuration.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Prefix applied to every counter key, to avoid collisions with
    /// unrelated data in a shared keyspace
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            key_prefix: "ratelimit".to_string(),
        }
    }
}

impl RedisStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            key_prefix: std::env::var("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or_else(|_| "ratelimit".to_string()),
        }
    }
}

/// Redis-backed counter store.
///
/// Atomicity is delegated entirely to Redis: `increment` runs a single Lua
/// script, so the counter bump and the one-time TTL arm are indivisible and
/// callers across processes are linearized by the server. This is the
/// backend for the 100k+ ops/sec tier.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    config: RedisStoreConfig,
    /// Lua script for atomic increment with one-time TTL
    script: Script,
}

impl RedisCounterStore {
    pub async fn new(config: RedisStoreConfig) -> Result<Self, CounterStoreError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CounterStoreError::Connection(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let mut conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| CounterStoreError::Connection("Connection timed out".to_string()))?
            .map_err(|e| CounterStoreError::Connection(e.to_string()))?;

        // Probe now so a bad URL fails at startup, not on first request.
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CounterStoreError::Connection(format!("Redis ping failed: {e}")))?;

        // The TTL is armed exactly once, when INCR creates the key.
        // Re-arming it on later increments would turn the fixed window into
        // a moving one that never resets under steady traffic, and a
        // two-step INCR + PEXPIRE would leave a race between the calls.
        // Millisecond precision keeps sub-second windows in step with the
        // other backends.
        let script = Script::new(
            r#"
            local current = redis.call('INCR', KEYS[1])
            if current == 1 then
                redis.call('PEXPIRE', KEYS[1], ARGV[1])
            end
            return current
            "#,
        );

        tracing::info!(url = %config.url, prefix = %config.key_prefix, "Connected to Redis counter store");

        Ok(Self {
            conn,
            config,
            script,
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, CounterStoreError> {
        Self::new(RedisStoreConfig::from_env()).await
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<CounterEntry>, CounterStoreError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        // One MULTI/EXEC round trip for both the value and the remaining TTL.
        let (count, ttl_millis): (Option<i64>, i64) = redis::pipe()
            .atomic()
            .get(&redis_key)
            .pttl(&redis_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CounterStoreError::operation(key, e))?;

        Ok(count.map(|count| CounterEntry {
            count,
            expires_at: Utc::now() + Duration::from_millis(ttl_millis.max(0) as u64),
        }))
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<i64, CounterStoreError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        self.script
            .key(&redis_key)
            .arg(window.as_millis().max(1) as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CounterStoreError::operation(key, e))
    }

    async fn reset(&self, key: &str) -> Result<(), CounterStoreError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        conn.del::<_, ()>(&redis_key)
            .await
            .map_err(|e| CounterStoreError::operation(key, e))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), CounterStoreError> {
        // ConnectionManager has no explicit shutdown; dropping the last
        // clone closes the underlying connection.
        tracing::debug!("Redis counter store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get_test_store() -> Option<RedisCounterStore> {
        let config = RedisStoreConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6389".to_string()),
            connect_timeout: Duration::from_secs(1),
            key_prefix: "test_counter".to_string(),
        };

        RedisCounterStore::new(config).await.ok()
    }

    fn unique_key(tag: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("{tag}:{nanos}")
    }

    #[tokio::test]
    async fn test_increment_and_window_reset() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => return,
        };
        let key = unique_key("window");

        assert_eq!(store.increment(&key, Duration::from_secs(1)).await.unwrap(), 1);
        assert_eq!(store.increment(&key, Duration::from_secs(1)).await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        // Window elapsed: the next increment starts a new one.
        assert_eq!(store.increment(&key, Duration::from_secs(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sub_second_window_is_not_rounded_up() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => return,
        };
        let key = unique_key("subsec");
        let window = Duration::from_millis(300);

        assert_eq!(store.increment(&key, window).await.unwrap(), 1);
        assert_eq!(store.increment(&key, window).await.unwrap(), 2);

        // A 300ms window rounded up to a whole second would still be live
        // here and the count would continue at 3.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.increment(&key, window).await.unwrap(), 1);

        store.reset(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_reports_count_and_expiry() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => return,
        };
        let key = unique_key("get");
        let before = Utc::now();

        assert!(store.get(&key).await.unwrap().is_none());

        store.increment(&key, Duration::from_secs(60)).await.unwrap();
        store.increment(&key, Duration::from_secs(60)).await.unwrap();

        let entry = store.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.count, 2);
        assert!(entry.expires_at > before);

        store.reset(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_removes_key() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => return,
        };
        let key = unique_key("reset");

        store.reset(&key).await.unwrap(); // Missing key is fine.

        store.increment(&key, Duration::from_secs(60)).await.unwrap();
        store.reset(&key).await.unwrap();

        assert!(store.get(&key).await.unwrap().is_none());
        assert_eq!(store.increment(&key, Duration::from_secs(1)).await.unwrap(), 1);
    }
}
