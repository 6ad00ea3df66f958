//! Cache Manager
//!
//! An explicitly constructed registry of named caches behind the
//! `ManagedCache` trait, with a shared invalidator, aggregate statistics,
//! and a health check. Callers hold their own manager instance; there is no
//! process-wide singleton.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{CacheConfig, EvictionPolicy};
use crate::engine::{CacheStatsSnapshot, MemoryCache};
use crate::error::{Error, Result};
use crate::invalidation::{CacheInvalidator, InvalidationContext};
use crate::metadata::{MetadataCache, MetadataSource};
use crate::query::QueryTextCache;
use crate::result::{table_tag, ResultCache};

/// Names of the caches `with_defaults` registers
pub const METADATA_CACHE: &str = "metadata";
pub const RESULT_CACHE: &str = "results";
pub const STATEMENT_CACHE: &str = "statements";
pub const QUERY_CACHE: &str = "queries";

/// Hit rate below this, with traffic, degrades a cache's health
const LOW_HIT_RATE: f64 = 0.5;
/// Occupancy above this degrades a cache's health
const HIGH_OCCUPANCY: f64 = 0.9;

// ============================================================
// Capability traits
// ============================================================

/// Inputs a warmable cache may need
#[derive(Debug, Clone, Default)]
pub struct WarmupContext {
    pub subjects: Vec<String>,
}

/// Optional pre-population capability; see [`ManagedCache::as_warmable`]
pub trait Warmable: Send + Sync {
    /// Returns how many units were loaded
    fn warm_up(&self, ctx: &WarmupContext) -> Result<usize>;
}

/// Object-safe surface the manager drives every registered cache through
pub trait ManagedCache: Send + Sync {
    fn kind(&self) -> &'static str;
    fn len(&self) -> usize;
    fn capacity(&self) -> usize;
    fn policy_name(&self) -> &'static str;
    fn stats_snapshot(&self) -> CacheStatsSnapshot;
    /// Remove entries filed under a tag; caches without tag support return 0
    fn invalidate_tag(&self, tag: &str) -> usize;
    fn clear(&self);
    fn as_warmable(&self) -> Option<&dyn Warmable> {
        None
    }
}

impl<V: Clone + Send + Sync + 'static> ManagedCache for MemoryCache<V> {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn len(&self) -> usize {
        MemoryCache::len(self)
    }

    fn capacity(&self) -> usize {
        self.max_size()
    }

    fn policy_name(&self) -> &'static str {
        self.policy().name()
    }

    fn stats_snapshot(&self) -> CacheStatsSnapshot {
        self.snapshot()
    }

    fn invalidate_tag(&self, tag: &str) -> usize {
        MemoryCache::invalidate_tag(self, tag)
    }

    fn clear(&self) {
        MemoryCache::clear(self);
    }
}

impl ManagedCache for ResultCache {
    fn kind(&self) -> &'static str {
        "results"
    }

    fn len(&self) -> usize {
        ResultCache::len(self)
    }

    fn capacity(&self) -> usize {
        self.max_size()
    }

    fn policy_name(&self) -> &'static str {
        ResultCache::policy_name(self)
    }

    fn stats_snapshot(&self) -> CacheStatsSnapshot {
        self.snapshot()
    }

    fn invalidate_tag(&self, tag: &str) -> usize {
        ResultCache::invalidate_tag(self, tag)
    }

    fn clear(&self) {
        ResultCache::clear(self);
    }
}

impl ManagedCache for MetadataCache {
    fn kind(&self) -> &'static str {
        "metadata"
    }

    fn len(&self) -> usize {
        MetadataCache::len(self)
    }

    fn capacity(&self) -> usize {
        self.max_size()
    }

    fn policy_name(&self) -> &'static str {
        self.store().policy().name()
    }

    fn stats_snapshot(&self) -> CacheStatsSnapshot {
        self.snapshot()
    }

    fn invalidate_tag(&self, tag: &str) -> usize {
        self.store().invalidate_tag(tag)
    }

    fn clear(&self) {
        MetadataCache::clear(self);
    }

    fn as_warmable(&self) -> Option<&dyn Warmable> {
        Some(self)
    }
}

impl Warmable for MetadataCache {
    fn warm_up(&self, ctx: &WarmupContext) -> Result<usize> {
        MetadataCache::warm_up(self, &ctx.subjects)
    }
}

impl ManagedCache for QueryTextCache {
    fn kind(&self) -> &'static str {
        "queries"
    }

    fn len(&self) -> usize {
        QueryTextCache::len(self)
    }

    fn capacity(&self) -> usize {
        self.max_size()
    }

    fn policy_name(&self) -> &'static str {
        "lru"
    }

    fn stats_snapshot(&self) -> CacheStatsSnapshot {
        self.snapshot_stats()
    }

    fn invalidate_tag(&self, _tag: &str) -> usize {
        // Query text entries carry no tags
        0
    }

    fn clear(&self) {
        QueryTextCache::clear(self);
    }
}

// ============================================================
// Manager
// ============================================================

/// Registration-time description of a cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheDescriptor {
    pub kind: String,
    pub description: String,
}

impl CacheDescriptor {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub hit_rate: f64,
    pub occupancy: f64,
    pub size: usize,
    pub capacity: usize,
    pub healthy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub warnings: Vec<String>,
    pub caches: BTreeMap<String, CacheHealth>,
}

#[derive(Default)]
pub struct CacheManager {
    caches: DashMap<String, Arc<dyn ManagedCache>>,
    configs: DashMap<String, CacheDescriptor>,
    invalidator: CacheInvalidator,
}

impl CacheManager {
    /// An empty manager with no caches and no dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager with the standard cache set and dependency graph.
    ///
    /// Registers `metadata` (schema metadata, no expiry), `results`
    /// (serialized query results, LRU with compression), `statements`
    /// (prepared statement text, LFU) and `queries` (query text, counter
    /// LRU). Row changes invalidate results and statements, schema changes
    /// everything, entity changes metadata and results.
    pub fn with_defaults(source: Arc<dyn MetadataSource>) -> Result<Self> {
        let manager = Self::new();

        manager.register_cache(
            METADATA_CACHE,
            Arc::new(MetadataCache::new(1000, source)?),
            CacheDescriptor::new("metadata", "entity schema metadata"),
        );
        manager.register_cache(
            RESULT_CACHE,
            Arc::new(ResultCache::with_defaults()),
            CacheDescriptor::new("results", "serialized query results"),
        );
        manager.register_cache(
            STATEMENT_CACHE,
            Arc::new(MemoryCache::<String>::new(CacheConfig::new(
                500,
                3600,
                EvictionPolicy::Lfu,
            )?)),
            CacheDescriptor::new("memory", "prepared statement text"),
        );
        manager.register_cache(
            QUERY_CACHE,
            Arc::new(QueryTextCache::new(500, 3600)?),
            CacheDescriptor::new("queries", "query text"),
        );

        let all: Vec<String> = [METADATA_CACHE, RESULT_CACHE, STATEMENT_CACHE, QUERY_CACHE]
            .iter()
            .map(|s| s.to_string())
            .collect();
        manager.invalidator.add_dependency(
            "rows_changed",
            &[RESULT_CACHE.to_string(), STATEMENT_CACHE.to_string()],
        );
        manager.invalidator.add_dependency("schema_changed", &all);
        manager.invalidator.add_dependency(
            "entity_changed",
            &[METADATA_CACHE.to_string(), RESULT_CACHE.to_string()],
        );

        Ok(manager)
    }

    // == Registry ==

    pub fn register_cache(
        &self,
        name: impl Into<String>,
        cache: Arc<dyn ManagedCache>,
        descriptor: CacheDescriptor,
    ) {
        let name = name.into();
        info!(cache = %name, kind = %descriptor.kind, "registering cache");
        self.configs.insert(name.clone(), descriptor);
        self.caches.insert(name, cache);
    }

    pub fn get_cache(&self, name: &str) -> Option<Arc<dyn ManagedCache>> {
        self.caches.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn descriptor(&self, name: &str) -> Option<CacheDescriptor> {
        self.configs.get(name).map(|entry| entry.value().clone())
    }

    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn invalidator(&self) -> &CacheInvalidator {
        &self.invalidator
    }

    // == Invalidation ==

    /// Run an invalidation event through the dependency graph and pattern
    /// handlers; returns the number of entries removed by the cascade.
    pub fn invalidate(
        &self,
        invalidation_type: &str,
        operation: &str,
        ctx: &InvalidationContext,
    ) -> usize {
        self.invalidator.invalidate(self, invalidation_type, operation, ctx)
    }

    /// Drop the table's tagged entries from every registered cache.
    pub fn invalidate_table(&self, table: &str) -> usize {
        let tag = table_tag(table);
        self.caches
            .iter()
            .map(|entry| entry.value().invalidate_tag(&tag))
            .sum()
    }

    pub fn invalidate_tables(&self, tables: &[String]) -> usize {
        tables.iter().map(|t| self.invalidate_table(t)).sum()
    }

    pub fn clear_all(&self) {
        for entry in self.caches.iter() {
            entry.value().clear();
        }
        info!("all caches cleared");
    }

    /// Drop all cached content, for test isolation
    pub fn reset(&self) {
        self.clear_all();
    }

    // == Warm-up ==

    /// Pre-populate caches.
    ///
    /// With a name, that cache must exist and be warmable. Without one,
    /// every warmable cache is warmed best-effort; individual failures are
    /// logged and skipped. Returns total units loaded.
    pub fn warm_up(&self, name: Option<&str>, ctx: &WarmupContext) -> Result<usize> {
        match name {
            Some(name) => {
                let cache = self
                    .get_cache(name)
                    .ok_or_else(|| Error::UnknownCache(name.to_string()))?;
                let warmable = cache
                    .as_warmable()
                    .ok_or_else(|| Error::NotWarmable(name.to_string()))?;
                warmable.warm_up(ctx)
            }
            None => {
                let mut loaded = 0;
                for entry in self.caches.iter() {
                    let Some(warmable) = entry.value().as_warmable() else {
                        continue;
                    };
                    match warmable.warm_up(ctx) {
                        Ok(count) => loaded += count,
                        Err(err) => {
                            warn!(cache = %entry.key(), error = %err, "warm-up failed, skipping");
                        }
                    }
                }
                Ok(loaded)
            }
        }
    }

    // == Observability ==

    pub fn get_stats(&self) -> HashMap<String, CacheStatsSnapshot> {
        self.caches
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats_snapshot()))
            .collect()
    }

    /// Health over every registered cache. A cache is degraded when its hit
    /// rate is below 50% despite traffic, or its occupancy is above 90%.
    pub fn get_health_check(&self) -> HealthReport {
        let mut warnings = Vec::new();
        let mut caches = BTreeMap::new();

        for entry in self.caches.iter() {
            let name = entry.key();
            let snapshot = entry.value().stats_snapshot();
            let traffic = snapshot.hits + snapshot.misses;
            let occupancy = snapshot.occupancy();

            let mut healthy = true;
            if traffic > 0 && snapshot.hit_rate < LOW_HIT_RATE {
                healthy = false;
                warnings.push(format!(
                    "cache {} hit rate {:.1}% below 50%",
                    name,
                    snapshot.hit_rate * 100.0
                ));
            }
            if occupancy > HIGH_OCCUPANCY {
                healthy = false;
                warnings.push(format!(
                    "cache {} occupancy {:.1}% above 90%",
                    name,
                    occupancy * 100.0
                ));
            }

            caches.insert(
                name.clone(),
                CacheHealth {
                    hit_rate: snapshot.hit_rate,
                    occupancy,
                    size: snapshot.size,
                    capacity: snapshot.max_size,
                    healthy,
                },
            );
        }

        let status = if warnings.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthReport {
            status,
            warnings,
            caches,
        }
    }

    // == External change triggers ==

    /// Rows in a table were inserted, updated or deleted.
    pub fn on_rows_changed(&self, table: &str) -> usize {
        let ctx = InvalidationContext::for_table(table);
        self.invalidate("rows_changed", "update", &ctx)
    }

    /// The schema changed in an unspecified way; everything dependent on it
    /// is cleared.
    pub fn on_schema_changed(&self) -> usize {
        self.invalidate("schema_changed", "alter", &InvalidationContext::default())
    }

    /// An entity-level change with caller-supplied scope.
    pub fn on_entity_changed(
        &self,
        entity: &str,
        operation: &str,
        mut ctx: InvalidationContext,
    ) -> usize {
        ctx.entity = Some(entity.to_string());
        self.invalidate("entity_changed", operation, &ctx)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::metadata::testing::StaticSource;

    fn default_manager() -> (CacheManager, Arc<StaticSource>) {
        let source = Arc::new(StaticSource::new());
        let manager = CacheManager::with_defaults(source.clone()).unwrap();
        (manager, source)
    }

    #[test]
    fn test_with_defaults_registers_standard_set() {
        let (manager, _) = default_manager();
        assert_eq!(
            manager.cache_names(),
            vec!["metadata", "queries", "results", "statements"]
        );
        assert!(manager.descriptor("results").is_some());
    }

    #[test]
    fn test_get_cache_unknown_is_none() {
        let (manager, _) = default_manager();
        assert!(manager.get_cache("nope").is_none());
    }

    #[test]
    fn test_warm_up_named_cache() {
        let (manager, source) = default_manager();
        let ctx = WarmupContext {
            subjects: vec!["user".to_string(), "order".to_string()],
        };

        let loaded = manager.warm_up(Some(METADATA_CACHE), &ctx).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(source.lookup_count(), 2);

        // Second run loads nothing new
        assert_eq!(manager.warm_up(Some(METADATA_CACHE), &ctx).unwrap(), 0);
    }

    #[test]
    fn test_warm_up_unknown_and_not_warmable() {
        let (manager, _) = default_manager();
        let ctx = WarmupContext::default();

        assert_matches!(
            manager.warm_up(Some("nope"), &ctx),
            Err(Error::UnknownCache(_))
        );
        assert_matches!(
            manager.warm_up(Some(RESULT_CACHE), &ctx),
            Err(Error::NotWarmable(_))
        );
    }

    #[test]
    fn test_warm_up_unnamed_is_best_effort() {
        let (manager, _) = default_manager();
        let ctx = WarmupContext {
            subjects: vec!["user".to_string(), "broken".to_string()],
        };

        // The metadata warm-up fails on "broken" but the call succeeds
        let loaded = manager.warm_up(None, &ctx).unwrap();
        assert_eq!(loaded, 0);
    }

    #[test]
    fn test_rows_changed_cascade() {
        let (manager, _) = default_manager();
        let results = Arc::new(ResultCache::with_defaults());
        results
            .set("SELECT * FROM users", &[], &vec![1u32, 2], &["users".to_string()])
            .unwrap();
        results
            .set("SELECT * FROM orders", &[], &vec![3u32], &["orders".to_string()])
            .unwrap();
        manager.register_cache(
            RESULT_CACHE,
            Arc::clone(&results) as Arc<dyn ManagedCache>,
            CacheDescriptor::new("results", "serialized query results"),
        );

        let removed = manager.on_rows_changed("users");
        assert_eq!(removed, 1);
        assert!(!results.contains("SELECT * FROM users", &[]));
        assert!(results.contains("SELECT * FROM orders", &[]));
    }

    #[test]
    fn test_schema_changed_clears_everything() {
        let (manager, _) = default_manager();
        let ctx = WarmupContext {
            subjects: vec!["user".to_string()],
        };
        manager.warm_up(None, &ctx).unwrap();
        let metadata = manager.get_cache(METADATA_CACHE).unwrap();
        assert!(metadata.len() > 0);

        manager.on_schema_changed();
        assert_eq!(metadata.len(), 0);
    }

    #[test]
    fn test_invalidate_table_spans_caches() {
        let (manager, _) = default_manager();
        let result_cache = ResultCache::with_defaults();
        result_cache
            .set("q1", &[], &1u32, &["users".to_string()])
            .unwrap();
        result_cache
            .set("q2", &[], &2u32, &["orders".to_string()])
            .unwrap();
        manager.register_cache(
            RESULT_CACHE,
            Arc::new(result_cache),
            CacheDescriptor::new("results", "serialized query results"),
        );

        assert_eq!(manager.invalidate_table("users"), 1);
        assert_eq!(manager.invalidate_table("users"), 0);
    }

    #[test]
    fn test_reset_clears_contents() {
        let (manager, _) = default_manager();
        let ctx = WarmupContext {
            subjects: vec!["user".to_string()],
        };
        manager.warm_up(None, &ctx).unwrap();

        manager.reset();
        for name in manager.cache_names() {
            assert_eq!(manager.get_cache(&name).unwrap().len(), 0);
        }
    }

    #[test]
    fn test_health_check_flags_low_hit_rate() {
        let (manager, _) = default_manager();
        let store = MemoryCache::<String>::new(
            CacheConfig::new(10, 0, EvictionPolicy::Lru).unwrap(),
        );
        store.get("missing");
        store.get("missing");
        manager.register_cache(
            "cold",
            Arc::new(store),
            CacheDescriptor::new("memory", "test"),
        );

        let report = manager.get_health_check();
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(!report.caches["cold"].healthy);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("cold") && w.contains("hit rate")));
    }

    #[test]
    fn test_health_check_flags_high_occupancy() {
        let (manager, _) = default_manager();
        let store = MemoryCache::<String>::new(
            CacheConfig::new(10, 0, EvictionPolicy::Lru).unwrap(),
        );
        for i in 0..10 {
            store.set(format!("k{}", i), "v".to_string());
        }
        // Keep the hit rate fine
        store.get("k0");
        manager.register_cache(
            "full",
            Arc::new(store),
            CacheDescriptor::new("memory", "test"),
        );

        let report = manager.get_health_check();
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("full") && w.contains("occupancy")));
    }

    #[test]
    fn test_health_check_idle_manager_is_healthy() {
        let (manager, _) = default_manager();
        let report = manager.get_health_check();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.caches.len(), 4);
    }

    #[test]
    fn test_entity_changed_reaches_pattern_handlers() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (manager, _) = default_manager();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        manager
            .invalidator()
            .on_pattern("entity_changed:user", move |_, operation, _, _| {
                assert_eq!(operation, "delete");
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        manager.on_entity_changed("user", "delete", InvalidationContext::default());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
