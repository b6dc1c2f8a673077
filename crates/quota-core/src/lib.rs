//! # Quota Core
//!
//! The domain layer of the quota subsystem: the `CounterStore` port that
//! every storage backend implements, and the rate-check algorithm that turns
//! raw counter increments into allow/deny decisions.
//! This crate contains no infrastructure dependencies.

pub mod error;
pub mod limiter;
pub mod ports;

pub use error::CounterStoreError;
pub use limiter::{RateLimitDecision, RateLimiter};
pub use ports::{CounterEntry, CounterStore};
