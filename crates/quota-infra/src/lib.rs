//! # Quota Infrastructure
//!
//! Concrete implementations of the `CounterStore` port defined in
//! `quota-core`, plus the factory that selects a backend from configuration
//! and the shared handle that holds the active one.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All backends enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `postgres` - PostgreSQL backend via SeaORM
//! - `redis` - Redis backend

pub mod factory;
pub mod handle;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis;

// Re-exports - In-Memory
pub use factory::{BackendKind, FactoryError, StoreConfig, build_store};
pub use handle::SharedCounterStore;
pub use memory::{MemoryCounterStore, MemoryStoreConfig};

// Re-exports - Postgres
#[cfg(feature = "postgres")]
pub use postgres::PostgresCounterStore;

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use self::redis::{RedisCounterStore, RedisStoreConfig};
