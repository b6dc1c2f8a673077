//! Ports - trait definitions for storage backends.
//! These are the "interfaces" that infrastructure must implement.

mod counter_store;

pub use counter_store::{CounterEntry, CounterStore};
