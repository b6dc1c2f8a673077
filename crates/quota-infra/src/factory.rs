//! Backend selection - builds one counter store from configuration.
//!
//! Validation happens here, at startup: a missing database handle, a missing
//! Redis URL, or an unknown backend name fails before any traffic is served.

use std::str::FromStr;
use std::sync::Arc;

use quota_core::error::CounterStoreError;
use quota_core::ports::CounterStore;

use crate::memory::{MemoryCounterStore, MemoryStoreConfig};

#[cfg(feature = "postgres")]
use sea_orm::DbConn;

#[cfg(feature = "postgres")]
use crate::postgres::PostgresCounterStore;

#[cfg(feature = "redis")]
use crate::redis::{RedisCounterStore, RedisStoreConfig};

/// Which substrate the counters live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Single-process in-memory map. The default.
    #[default]
    Local,
    /// Rows in a shared PostgreSQL table.
    Postgres,
    /// Keys in a shared Redis keyspace.
    Redis,
}

impl FromStr for BackendKind {
    type Err = FactoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "local" => Ok(Self::Local),
            "postgres" => Ok(Self::Postgres),
            "redis" => Ok(Self::Redis),
            other => Err(FactoryError::UnknownBackend(other.to_string())),
        }
    }
}

/// Configuration errors - raised at construction, fatal to startup.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("Unknown counter backend '{0}', expected one of: local, postgres, redis")]
    UnknownBackend(String),

    #[error("Counter backend 'postgres' requires a database connection")]
    MissingDatabase,

    #[error("Counter backend 'redis' requires a Redis URL")]
    MissingRedisUrl,

    #[error("Counter backend '{backend}' is not compiled in (missing crate feature)")]
    BackendDisabled { backend: &'static str },

    #[error("Failed to connect to counter backend: {0}")]
    Connect(#[from] CounterStoreError),
}

/// Counter store configuration.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub memory: MemoryStoreConfig,
    #[cfg(feature = "redis")]
    pub redis: Option<RedisStoreConfig>,
    /// Externally-owned database handle, required for the postgres backend.
    /// Not read from the environment; the application supplies it.
    #[cfg(feature = "postgres")]
    pub database: Option<DbConn>,
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// `RATE_LIMIT_BACKEND` selects the backend (`local` when unset); the
    /// Redis section is populated whenever `REDIS_URL` is present.
    pub fn from_env() -> Result<Self, FactoryError> {
        let backend = std::env::var("RATE_LIMIT_BACKEND")
            .unwrap_or_default()
            .parse()?;

        Ok(Self {
            backend,
            memory: MemoryStoreConfig::from_env(),
            #[cfg(feature = "redis")]
            redis: std::env::var("REDIS_URL")
                .ok()
                .map(|_| RedisStoreConfig::from_env()),
            #[cfg(feature = "postgres")]
            database: None,
        })
    }
}

/// Build the configured counter store.
pub async fn build_store(config: &StoreConfig) -> Result<Arc<dyn CounterStore>, FactoryError> {
    match config.backend {
        BackendKind::Local => {
            tracing::info!(
                sweep_interval_secs = config.memory.sweep_interval.as_secs(),
                "Using in-memory counter store"
            );
            Ok(Arc::new(MemoryCounterStore::new(config.memory.clone())))
        }

        #[cfg(feature = "postgres")]
        BackendKind::Postgres => {
            let db = config
                .database
                .clone()
                .ok_or(FactoryError::MissingDatabase)?;
            tracing::info!("Using PostgreSQL counter store");
            Ok(Arc::new(PostgresCounterStore::new(db)))
        }

        #[cfg(feature = "redis")]
        BackendKind::Redis => {
            let redis = config.redis.clone().ok_or(FactoryError::MissingRedisUrl)?;
            let store = RedisCounterStore::new(redis).await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "postgres"))]
        BackendKind::Postgres => Err(FactoryError::BackendDisabled {
            backend: "postgres",
        }),

        #[cfg(not(feature = "redis"))]
        BackendKind::Redis => Err(FactoryError::BackendDisabled { backend: "redis" }),
    }
}
