//! Query Result Cache
//!
//! Caches serialized query results keyed by a fingerprint of the statement
//! text and its parameters. Large payloads are LZ4-compressed when that
//! shrinks them. Entries are tagged with the tables they depend on so a
//! table change can drop every dependent result at once.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::compression::{compress_if_worthwhile, decompress_payload, DEFAULT_COMPRESSION_THRESHOLD};
use crate::config::{CacheConfig, EvictionPolicy};
use crate::engine::{fx_hash, CacheStatsSnapshot, MemoryCache};
use crate::error::Result;

/// Tag prefix linking a result to a table it was computed from
pub fn table_tag(table: &str) -> String {
    format!("table:{}", table)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCacheConfig {
    pub max_size: usize,
    pub ttl_seconds: u64,
    pub eviction_policy: EvictionPolicy,
    /// Payloads at or above this many bytes are considered for compression
    pub compression_threshold: usize,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl_seconds: 300,
            eviction_policy: EvictionPolicy::Lru,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
        }
    }
}

/// Stored payload: serialized result bytes plus the compression flag
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub bytes: Bytes,
    pub compressed: bool,
}

/// Cache key: statement and parameter fingerprints, stable across processes
pub fn result_key(sql: &str, params: &[serde_json::Value]) -> String {
    let params_json = serde_json::to_vec(params).unwrap_or_default();
    format!("query:{:x}:{:x}", fx_hash(sql.as_bytes()), fx_hash(&params_json))
}

pub struct ResultCache {
    store: MemoryCache<StoredResult>,
    compression_threshold: usize,
    decompress_failures: AtomicU64,
}

impl ResultCache {
    pub fn new(config: ResultCacheConfig) -> Result<Self> {
        let cache_config = CacheConfig::new(
            config.max_size,
            config.ttl_seconds,
            config.eviction_policy,
        )?;
        Ok(Self {
            store: MemoryCache::new(cache_config),
            compression_threshold: config.compression_threshold,
            decompress_failures: AtomicU64::new(0),
        })
    }

    pub fn with_defaults() -> Self {
        Self {
            store: MemoryCache::with_defaults(),
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            decompress_failures: AtomicU64::new(0),
        }
    }

    /// Serialize and store a result, tagging it with its source tables.
    pub fn set<T: Serialize>(
        &self,
        sql: &str,
        params: &[serde_json::Value],
        value: &T,
        tables: &[String],
    ) -> Result<()> {
        let raw = serde_json::to_vec(value)?;
        let (bytes, compressed) = compress_if_worthwhile(&raw, self.compression_threshold);
        let key = result_key(sql, params);
        self.store.set(key.clone(), StoredResult { bytes, compressed });
        if !tables.is_empty() {
            let tags: Vec<String> = tables.iter().map(|t| table_tag(t)).collect();
            self.store.tag(&key, &tags);
        }
        Ok(())
    }

    /// Fetch and deserialize a cached result.
    ///
    /// A payload whose compressed form no longer decompresses is retried as
    /// raw bytes; payloads that fail to deserialize are dropped. Either way
    /// the caller sees a miss, never an error.
    pub fn get<T: DeserializeOwned>(&self, sql: &str, params: &[serde_json::Value]) -> Option<T> {
        let key = result_key(sql, params);
        let stored = self.store.get(&key)?;
        let bytes = if stored.compressed {
            match decompress_payload(&stored.bytes) {
                Ok(bytes) => bytes,
                Err(err) => {
                    self.decompress_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %err, "decompression failed, retrying as raw");
                    stored.bytes.clone()
                }
            }
        } else {
            stored.bytes.clone()
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key = %key, error = %err, "cached result failed to deserialize, dropping");
                self.store.delete(&key);
                None
            }
        }
    }

    pub fn contains(&self, sql: &str, params: &[serde_json::Value]) -> bool {
        self.store.has(&result_key(sql, params))
    }

    pub fn delete(&self, sql: &str, params: &[serde_json::Value]) -> bool {
        self.store.delete(&result_key(sql, params))
    }

    /// Drop every result computed from the table; returns the count removed
    pub fn invalidate_table(&self, table: &str) -> usize {
        self.store.invalidate_tag(&table_tag(table))
    }

    pub fn invalidate_tables(&self, tables: &[String]) -> usize {
        tables.iter().map(|t| self.invalidate_table(t)).sum()
    }

    pub fn invalidate_tag(&self, tag: &str) -> usize {
        self.store.invalidate_tag(tag)
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.store.max_size()
    }

    pub fn decompress_failures(&self) -> u64 {
        self.decompress_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        self.store.snapshot()
    }

    pub(crate) fn policy_name(&self) -> &'static str {
        self.store.policy().name()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: u64,
        name: String,
    }

    fn sample_rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| Row {
                id: i as u64,
                name: format!("row-{}", i),
            })
            .collect()
    }

    #[test]
    fn test_set_get_round_trip() {
        let cache = ResultCache::with_defaults();
        let params = vec![serde_json::json!(42)];
        let rows = sample_rows(3);

        cache
            .set("SELECT * FROM users WHERE id = ?", &params, &rows, &["users".to_string()])
            .unwrap();

        let fetched: Vec<Row> = cache.get("SELECT * FROM users WHERE id = ?", &params).unwrap();
        assert_eq!(fetched, rows);
    }

    #[test]
    fn test_key_distinguishes_params() {
        let cache = ResultCache::with_defaults();
        let rows = sample_rows(1);
        cache
            .set("SELECT 1", &[serde_json::json!(1)], &rows, &[])
            .unwrap();

        let miss: Option<Vec<Row>> = cache.get("SELECT 1", &[serde_json::json!(2)]);
        assert!(miss.is_none());
        assert!(cache.contains("SELECT 1", &[serde_json::json!(1)]));
    }

    #[test]
    fn test_large_payload_is_compressed() {
        let config = ResultCacheConfig {
            compression_threshold: 64,
            ..ResultCacheConfig::default()
        };
        let cache = ResultCache::new(config).unwrap();
        let rows = sample_rows(200);
        cache.set("SELECT * FROM big", &[], &rows, &[]).unwrap();

        let stored = cache.store.get(&result_key("SELECT * FROM big", &[])).unwrap();
        assert!(stored.compressed);

        let fetched: Vec<Row> = cache.get("SELECT * FROM big", &[]).unwrap();
        assert_eq!(fetched, rows);
    }

    #[test]
    fn test_small_payload_stays_raw() {
        let cache = ResultCache::with_defaults();
        cache.set("SELECT 1", &[], &1u32, &[]).unwrap();

        let stored = cache.store.get(&result_key("SELECT 1", &[])).unwrap();
        assert!(!stored.compressed);
    }

    #[test]
    fn test_invalidate_table_is_scoped() {
        let cache = ResultCache::with_defaults();
        let rows = sample_rows(1);
        cache
            .set("SELECT * FROM users", &[], &rows, &["users".to_string()])
            .unwrap();
        cache
            .set("SELECT * FROM orders", &[], &rows, &["orders".to_string()])
            .unwrap();
        cache
            .set(
                "SELECT * FROM users JOIN orders",
                &[],
                &rows,
                &["users".to_string(), "orders".to_string()],
            )
            .unwrap();

        let removed = cache.invalidate_table("users");
        assert_eq!(removed, 2);
        assert!(cache.contains("SELECT * FROM orders", &[]));
        assert!(!cache.contains("SELECT * FROM users JOIN orders", &[]));
    }

    #[test]
    fn test_corrupt_payload_drops_entry() {
        let cache = ResultCache::with_defaults();
        let key = result_key("SELECT 1", &[]);
        cache.store.set(
            key,
            StoredResult {
                bytes: Bytes::from_static(b"not json"),
                compressed: false,
            },
        );

        let miss: Option<Vec<Row>> = cache.get("SELECT 1", &[]);
        assert!(miss.is_none());
        assert!(!cache.contains("SELECT 1", &[]));
    }

    #[test]
    fn test_decompress_failure_counted() {
        let cache = ResultCache::with_defaults();
        let key = result_key("SELECT 1", &[]);
        // Flagged compressed but not a valid lz4 block
        cache.store.set(
            key,
            StoredResult {
                bytes: Bytes::from_static(b"garbage"),
                compressed: true,
            },
        );

        let miss: Option<Vec<Row>> = cache.get("SELECT 1", &[]);
        assert!(miss.is_none());
        assert_eq!(cache.decompress_failures(), 1);
    }
}
