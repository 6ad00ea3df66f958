//! Cache Engine
//!
//! Building blocks shared by every cache in this crate: the entry record,
//! the bidirectional tag index, atomic statistics, and the policy-driven
//! store itself.

pub mod entry;
pub mod stats;
pub mod store;
pub mod tags;

#[cfg(test)]
mod proptest;

pub use entry::{epoch_millis, fx_hash, CacheEntry};
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::MemoryCache;
pub use tags::TagIndex;
