//! Query Text Cache
//!
//! Stores prepared query text keyed by a caller-chosen name. Recency is
//! tracked with a monotonically increasing counter rather than wall-clock
//! time, so access order survives clock adjustments and stays total. Hit
//! counts drive hot/cold ranking and cold-percentage eviction. The whole
//! cache can be exported to a serializable snapshot and re-imported.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::entry::epoch_millis;
use crate::engine::{CacheStats, CacheStatsSnapshot};
use crate::error::{Error, Result};
use crate::invalidation::glob_to_regex;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueryEntry {
    text: String,
    /// Epoch millis deadline; None = no expiry
    expires_at: Option<u64>,
    /// Counter value at the most recent access
    last_used: u64,
    hits: u64,
    /// Insertion order, used to break ranking ties
    seq: u64,
}

impl QueryEntry {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => epoch_millis() > deadline,
            None => false,
        }
    }
}

#[derive(Debug)]
struct QueryInner {
    entries: HashMap<String, QueryEntry>,
    counter: u64,
    next_seq: u64,
    max_size: usize,
}

impl QueryInner {
    /// Evict least-recently-used entries until `bound` holds; returns the
    /// eviction count
    fn evict_lru_to(&mut self, bound: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > bound {
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.last_used, e.seq))
                .map(|(k, _)| k.clone());
            match victim {
                Some(key) => {
                    self.entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

/// Serializable image of the cache; see [`QueryTextCache::export`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCacheSnapshot {
    entries: HashMap<String, QueryEntry>,
    /// Key to last-used counter value, kept separately so import can verify
    /// both maps reference the same key set
    access_order: HashMap<String, u64>,
    counter: u64,
    next_seq: u64,
}

#[derive(Debug)]
pub struct QueryTextCache {
    inner: Mutex<QueryInner>,
    stats: CacheStats,
    ttl_seconds: u64,
}

impl QueryTextCache {
    /// Both `max_size` and `ttl_seconds` must be positive.
    pub fn new(max_size: usize, ttl_seconds: u64) -> Result<Self> {
        if max_size == 0 {
            return Err(Error::InvalidConfig(
                "max_size must be positive".to_string(),
            ));
        }
        if ttl_seconds == 0 {
            return Err(Error::InvalidConfig(
                "ttl_seconds must be positive".to_string(),
            ));
        }
        Ok(Self {
            inner: Mutex::new(QueryInner {
                entries: HashMap::new(),
                counter: 0,
                next_seq: 0,
                max_size,
            }),
            stats: CacheStats::new(),
            ttl_seconds,
        })
    }

    // == Core operations ==

    pub fn get(&self, name: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        if matches!(inner.entries.get(name), Some(entry) if entry.is_expired()) {
            inner.entries.remove(name);
            drop(inner);
            self.stats.record_expiration();
            self.stats.record_miss();
            return None;
        }
        inner.counter += 1;
        let counter = inner.counter;
        let text = inner.entries.get_mut(name).map(|entry| {
            entry.last_used = counter;
            entry.hits += 1;
            entry.text.clone()
        });
        drop(inner);
        match text {
            Some(text) => {
                self.stats.record_hit();
                Some(text)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    pub fn set(&self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        let mut inner = self.inner.lock();

        let mut evicted = 0;
        if !inner.entries.contains_key(&name) && inner.entries.len() >= inner.max_size {
            let bound = inner.max_size.saturating_sub(1);
            evicted = inner.evict_lru_to(bound);
        }

        inner.counter += 1;
        let entry = QueryEntry {
            text: text.into(),
            expires_at: Some(epoch_millis() + self.ttl_seconds * 1000),
            last_used: inner.counter,
            hits: 0,
            seq: inner.next_seq,
        };
        inner.next_seq += 1;
        inner.entries.insert(name, entry);
        drop(inner);

        for _ in 0..evicted {
            self.stats.record_eviction();
        }
        self.stats.record_write();
    }

    /// Read-only probe; no recency or hit-count update
    pub fn has(&self, name: &str) -> bool {
        self.inner
            .lock()
            .entries
            .get(name)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    pub fn delete(&self, name: &str) -> bool {
        let removed = self.inner.lock().entries.remove(name).is_some();
        if removed {
            self.stats.record_delete();
        }
        removed
    }

    // == Pattern and sweep maintenance ==

    /// Delete every entry whose name matches the glob; returns the count.
    pub fn clear_by_pattern(&self, glob: &str) -> Result<usize> {
        let regex = glob_to_regex(glob)?;
        let mut inner = self.inner.lock();
        let matching: Vec<String> = inner
            .entries
            .keys()
            .filter(|name| regex.is_match(name))
            .cloned()
            .collect();
        for name in &matching {
            inner.entries.remove(name);
        }
        drop(inner);
        for _ in 0..matching.len() {
            self.stats.record_delete();
        }
        debug!(glob, removed = matching.len(), "cleared by pattern");
        Ok(matching.len())
    }

    /// Sweep expired entries; each removal counts as an eviction.
    pub fn cleanup(&self) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &expired {
            inner.entries.remove(name);
        }
        drop(inner);
        for _ in 0..expired.len() {
            self.stats.record_eviction();
        }
        expired.len()
    }

    /// Evict the coldest ⌈percentage⌉ of entries by hit count.
    pub fn evict_cold_queries(&self, percentage: f64) -> usize {
        let percentage = percentage.clamp(0.0, 100.0);
        let mut inner = self.inner.lock();
        let count = ((inner.entries.len() as f64) * percentage / 100.0).ceil() as usize;
        if count == 0 {
            return 0;
        }
        let mut ranked: Vec<(String, u64, u64)> = inner
            .entries
            .iter()
            .map(|(name, e)| (name.clone(), e.hits, e.seq))
            .collect();
        ranked.sort_by_key(|(_, hits, seq)| (*hits, *seq));
        let victims: Vec<String> = ranked.into_iter().take(count).map(|(name, _, _)| name).collect();
        for name in &victims {
            inner.entries.remove(name);
        }
        drop(inner);
        for _ in 0..victims.len() {
            self.stats.record_eviction();
        }
        debug!(percentage, evicted = victims.len(), "evicted cold queries");
        victims.len()
    }

    // == Ranking ==

    /// Most-hit entries first; ties resolve to older insertions first
    pub fn hot_queries(&self, limit: usize) -> Vec<(String, u64)> {
        let inner = self.inner.lock();
        let mut ranked: Vec<(String, u64, u64)> = inner
            .entries
            .iter()
            .map(|(name, e)| (name.clone(), e.hits, e.seq))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.into_iter().take(limit).map(|(name, hits, _)| (name, hits)).collect()
    }

    /// Least-hit entries first; ties resolve to older insertions first
    pub fn cold_queries(&self, limit: usize) -> Vec<(String, u64)> {
        let inner = self.inner.lock();
        let mut ranked: Vec<(String, u64, u64)> = inner
            .entries
            .iter()
            .map(|(name, e)| (name.clone(), e.hits, e.seq))
            .collect();
        ranked.sort_by_key(|(_, hits, seq)| (*hits, *seq));
        ranked.into_iter().take(limit).map(|(name, hits, _)| (name, hits)).collect()
    }

    // == Snapshot ==

    /// Serializable image of the current contents and access order.
    pub fn export(&self) -> QueryCacheSnapshot {
        let inner = self.inner.lock();
        QueryCacheSnapshot {
            entries: inner.entries.clone(),
            access_order: inner
                .entries
                .iter()
                .map(|(name, e)| (name.clone(), e.last_used))
                .collect(),
            counter: inner.counter,
            next_seq: inner.next_seq,
        }
    }

    /// Replace the contents from a snapshot.
    ///
    /// The entry map and access-order map must cover the same key set, and
    /// each entry's recorded recency must agree, otherwise the snapshot is
    /// rejected as corrupt. A snapshot larger than the current bound is
    /// trimmed by LRU eviction.
    pub fn import(&self, snapshot: QueryCacheSnapshot) -> Result<()> {
        if snapshot.entries.len() != snapshot.access_order.len() {
            return Err(Error::CorruptSnapshot(format!(
                "entry map has {} keys, access order has {}",
                snapshot.entries.len(),
                snapshot.access_order.len()
            )));
        }
        for (name, entry) in &snapshot.entries {
            match snapshot.access_order.get(name) {
                Some(last_used) if *last_used == entry.last_used => {}
                Some(_) => {
                    return Err(Error::CorruptSnapshot(format!(
                        "access order disagrees for key {}",
                        name
                    )));
                }
                None => {
                    return Err(Error::CorruptSnapshot(format!(
                        "key {} missing from access order",
                        name
                    )));
                }
            }
        }

        let mut inner = self.inner.lock();
        inner.entries = snapshot.entries;
        inner.counter = snapshot.counter;
        inner.next_seq = snapshot.next_seq;
        let bound = inner.max_size;
        let trimmed = inner.evict_lru_to(bound);
        drop(inner);
        if trimmed > 0 {
            warn!(trimmed, "imported snapshot exceeded capacity");
            for _ in 0..trimmed {
                self.stats.record_eviction();
            }
        }
        Ok(())
    }

    // == Sizing and health ==

    /// Change the capacity; shrinking evicts LRU entries down to the new
    /// bound. Returns the eviction count.
    pub fn resize(&self, new_max: usize) -> Result<usize> {
        if new_max == 0 {
            return Err(Error::InvalidConfig(
                "max_size must be positive".to_string(),
            ));
        }
        let mut inner = self.inner.lock();
        inner.max_size = new_max;
        let evicted = inner.evict_lru_to(new_max);
        drop(inner);
        for _ in 0..evicted {
            self.stats.record_eviction();
        }
        Ok(evicted)
    }

    pub fn is_healthy(&self) -> bool {
        self.diagnose().is_empty()
    }

    /// Structural problems found, empty when healthy
    pub fn diagnose(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut problems = Vec::new();
        if inner.entries.len() > inner.max_size {
            problems.push(format!(
                "size {} exceeds max_size {}",
                inner.entries.len(),
                inner.max_size
            ));
        }
        for (name, entry) in &inner.entries {
            if entry.last_used > inner.counter {
                problems.push(format!(
                    "entry {} has last_used {} beyond counter {}",
                    name, entry.last_used, inner.counter
                ));
            }
            if entry.seq >= inner.next_seq {
                problems.push(format!(
                    "entry {} has seq {} beyond next_seq {}",
                    name, entry.seq, inner.next_seq
                ));
            }
        }
        problems
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.inner.lock().max_size
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn snapshot_stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot(self.len(), self.max_size(), "lru")
    }
}
