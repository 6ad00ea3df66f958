//! Tagged multi-policy in-memory caching.
//!
//! The crate is built around a generic [`MemoryCache`] engine with pluggable
//! eviction (LRU, LFU, FIFO), lazy TTL expiry and a bidirectional tag index,
//! plus specialized caches on top of it:
//!
//! - [`metadata::MetadataCache`] reads entity schema metadata through from a
//!   [`metadata::MetadataSource`] and supports bulk warm-up.
//! - [`result::ResultCache`] stores serialized query results, compressing
//!   large payloads with LZ4 and tagging each result with its source tables.
//! - [`query::QueryTextCache`] keeps query text with hot/cold ranking and a
//!   serializable snapshot for export and import.
//!
//! [`manager::CacheManager`] is an explicitly constructed registry over all
//! of them, and [`invalidation::CacheInvalidator`] routes change events
//! through a dependency graph and glob-pattern handlers.
//!
//! ```
//! use tagcache::{CacheConfig, EvictionPolicy, MemoryCache};
//!
//! let cache = MemoryCache::new(CacheConfig::new(100, 60, EvictionPolicy::Lru)?);
//! cache.set("greeting", "hello".to_string());
//! cache.tag("greeting", &["salutations".to_string()]);
//!
//! assert_eq!(cache.get("greeting"), Some("hello".to_string()));
//! assert_eq!(cache.invalidate_tag("salutations"), 1);
//! assert!(!cache.has("greeting"));
//! # Ok::<(), tagcache::Error>(())
//! ```

pub mod compression;
pub mod config;
pub mod engine;
pub mod error;
pub mod invalidation;
pub mod manager;
pub mod metadata;
pub mod query;
pub mod result;

pub use config::{CacheConfig, EvictionPolicy};
pub use engine::{CacheStats, CacheStatsSnapshot, MemoryCache, TagIndex};
pub use error::{Error, Result};
pub use invalidation::{CacheInvalidator, InvalidationContext};
pub use manager::{
    CacheDescriptor, CacheManager, HealthReport, HealthStatus, ManagedCache, Warmable,
    WarmupContext,
};
pub use metadata::{MetadataCache, MetadataSource, SubjectMetadata};
pub use query::{QueryCacheSnapshot, QueryTextCache};
pub use result::{ResultCache, ResultCacheConfig};
