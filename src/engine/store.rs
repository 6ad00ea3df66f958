//! Cache Store
//!
//! The core key/value engine: lazy TTL expiry, size-bounded eviction under a
//! configurable policy, tag bookkeeping, and statistics.
//!
//! # Design
//!
//! - All structural state (entry map, tag index, insertion-order queue) lives
//!   behind one `parking_lot::Mutex`, so the check-size -> evict -> insert
//!   sequence is atomic per cache instance.
//! - Statistics are atomics updated outside the lock.
//! - FIFO victim selection uses an explicit `(seq, key)` queue rather than
//!   map iteration order; stale queue pairs are skipped and compacted.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::debug;

use super::entry::CacheEntry;
use super::stats::{CacheStats, CacheStatsSnapshot};
use super::tags::TagIndex;
use crate::config::{CacheConfig, EvictionPolicy};

/// Core in-memory cache engine
pub struct MemoryCache<V> {
    inner: Mutex<CacheInner<V>>,
    stats: CacheStats,
    config: CacheConfig,
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    tags: TagIndex,
    /// Insertion order as (seq, key); a pair is live only while the entry's
    /// seq still matches
    order: VecDeque<(u64, String)>,
    next_seq: u64,
}

impl<V> CacheInner<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            tags: TagIndex::new(),
            order: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Remove an entry and its tag references; the order queue is left to
    /// lazy skipping
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.tags.remove_key(key);
        }
        removed
    }

    /// Choose the victim key for an insertion into a full cache
    fn select_victim(&mut self, policy: EvictionPolicy) -> Option<String> {
        match policy {
            EvictionPolicy::Lru => self
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.last_access, e.seq))
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Lfu => self
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.access_count, e.seq))
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Fifo => {
                // Pop stale pairs (deleted or re-inserted keys) until the
                // front references a live entry
                while let Some((seq, key)) = self.order.front() {
                    match self.entries.get(key) {
                        Some(entry) if entry.seq == *seq => {
                            return Some(key.clone());
                        }
                        _ => {
                            self.order.pop_front();
                        }
                    }
                }
                None
            }
        }
    }

    /// Drop stale pairs once the queue outgrows the entry map
    fn maybe_compact_order(&mut self) {
        if self.order.len() > self.entries.len() * 2 + 16 {
            let entries = &self.entries;
            self.order
                .retain(|(seq, key)| entries.get(key).is_some_and(|e| e.seq == *seq));
        }
    }
}

impl<V: Clone> MemoryCache<V> {
    /// Create a new cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        debug!(
            max_size = config.max_size,
            ttl_seconds = config.ttl_seconds,
            policy = config.eviction_policy.name(),
            "creating cache"
        );
        Self {
            inner: Mutex::new(CacheInner::new()),
            stats: CacheStats::new(),
            config,
        }
    }

    /// Create a cache with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    // == Get ==
    /// Retrieve a value by key.
    ///
    /// Absent keys record a miss. Expired entries are removed as a side
    /// effect and record a miss. A live hit updates last-access and access
    /// count.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        if matches!(inner.entries.get(key), Some(entry) if entry.is_expired()) {
            inner.remove_entry(key);
            drop(inner);
            self.record(|s| {
                s.record_expiration();
                s.record_miss();
            });
            return None;
        }
        let value = inner.entries.get_mut(key).map(|entry| {
            entry.record_access();
            entry.value.clone()
        });
        drop(inner);
        match value {
            Some(value) => {
                self.record(CacheStats::record_hit);
                Some(value)
            }
            None => {
                self.record(CacheStats::record_miss);
                None
            }
        }
    }

    // == Set ==
    /// Store a value under the configured default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.config.ttl_seconds)
    }

    /// Store a value with an explicit TTL (0 = no expiry).
    ///
    /// Inserting a new key into a full cache evicts one victim first;
    /// overwriting an existing key never evicts. Bookkeeping (expiry,
    /// last-access, access count) is reset on every write.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl_seconds: u64) {
        let key = key.into();
        let mut inner = self.inner.lock();

        let is_new = !inner.entries.contains_key(&key);
        let mut evicted = false;
        if is_new && inner.entries.len() >= self.config.max_size {
            if let Some(victim) = inner.select_victim(self.config.eviction_policy) {
                debug!(key = %victim, policy = self.config.eviction_policy.name(), "evicting");
                inner.remove_entry(&victim);
                evicted = true;
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(key.clone(), CacheEntry::new(value, ttl_seconds, seq));
        inner.order.push_back((seq, key));
        inner.maybe_compact_order();
        drop(inner);

        self.record(|s| {
            if evicted {
                s.record_eviction();
            }
            s.record_write();
        });
    }

    // == Delete ==
    /// Remove an entry, purging it from the tag index in both directions.
    ///
    /// Returns false (and records nothing) when the key is absent.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.inner.lock().remove_entry(key).is_some();
        if removed {
            self.record(CacheStats::record_delete);
        }
        removed
    }

    // == Has ==
    /// Read-only probe: present and not expired. Does not touch access
    /// bookkeeping and does not remove expired entries.
    pub fn has(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    // == Bulk variants ==
    /// Pointwise `get` over a batch; no atomicity across the batch.
    pub fn get_multiple(&self, keys: &[String]) -> HashMap<String, V> {
        keys.iter()
            .filter_map(|key| self.get(key).map(|value| (key.clone(), value)))
            .collect()
    }

    /// Pointwise `set` over a batch.
    pub fn set_multiple(&self, items: Vec<(String, V)>) {
        for (key, value) in items {
            self.set(key, value);
        }
    }

    /// Pointwise `delete` over a batch; returns the number removed.
    pub fn delete_multiple(&self, keys: &[String]) -> usize {
        keys.iter().filter(|key| self.delete(key)).count()
    }

    // == Tagging ==
    /// Attach tags to an existing key. No-op when the key is absent.
    pub fn tag(&self, key: &str, tags: &[String]) -> bool {
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(key) {
            return false;
        }
        inner.tags.insert(key, tags);
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.tags.extend(tags.iter().cloned());
        }
        true
    }

    /// Delete every key filed under a tag; returns the number removed.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let keys = {
            let inner = self.inner.lock();
            inner.tags.keys_for(tag)
        };
        let removed = self.delete_multiple(&keys);
        if removed > 0 {
            debug!(tag, removed, "invalidated tag");
        }
        removed
    }

    /// Sequential tag invalidation; overlapping keys are deleted once.
    pub fn invalidate_tags(&self, tags: &[String]) -> usize {
        tags.iter().map(|tag| self.invalidate_tag(tag)).sum()
    }

    /// Tags attached to a key (diagnostics helper)
    pub fn tags_for(&self, key: &str) -> Vec<String> {
        self.inner.lock().tags.tags_for(key)
    }

    /// Whether any live key is filed under the tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.inner.lock().tags.has_tag(tag)
    }

    // == Maintenance ==
    /// Drop all entries and tag state. Historical counters are preserved;
    /// only content is reset.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.tags.clear();
        inner.order.clear();
    }

    /// Explicit sweep removing every expired entry; returns the count.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove_entry(key);
        }
        drop(inner);
        for _ in 0..expired.len() {
            self.record(CacheStats::record_expiration);
        }
        expired.len()
    }

    // == Introspection ==
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.config.eviction_policy
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Point-in-time statistics snapshot
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        self.stats.snapshot(
            self.len(),
            self.config.max_size,
            self.config.eviction_policy.name(),
        )
    }

    /// Tag-index consistency probe (diagnostics / tests)
    pub fn tag_index_consistent(&self) -> bool {
        self.inner.lock().tags.is_consistent()
    }

    fn record(&self, f: impl FnOnce(&CacheStats)) {
        if self.config.enable_stats {
            f(&self.stats);
        }
    }
}

impl<V: Clone> std::fmt::Debug for MemoryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("max_size", &self.config.max_size)
            .field("ttl_seconds", &self.config.ttl_seconds)
            .field("policy", &self.config.eviction_policy)
            .field("len", &self.len())
            .finish()
    }
}
