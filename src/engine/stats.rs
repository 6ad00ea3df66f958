//! Cache Statistics
//!
//! Lock-free atomic counters updated outside the store lock, plus a
//! serializable snapshot for the diagnostics surface.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic statistics counters for a cache instance
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl CacheStats {
    /// Create a new collector with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// hits / (hits + misses), or 0.0 with no traffic
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Take a point-in-time snapshot
    pub fn snapshot(
        &self,
        size: usize,
        max_size: usize,
        eviction_policy: &str,
    ) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            deletes: self.deletes(),
            evictions: self.evictions(),
            expirations: self.expirations(),
            hit_rate: self.hit_rate(),
            size,
            max_size,
            eviction_policy: eviction_policy.to_string(),
        }
    }
}

/// Point-in-time statistics snapshot for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Derived: hits / (hits + misses)
    pub hit_rate: f64,
    /// Current entry count
    pub size: usize,
    /// Configured capacity
    pub max_size: usize,
    /// Policy name (lru / lfu / fifo)
    pub eviction_policy: String,
}

impl CacheStatsSnapshot {
    /// Occupancy as a fraction of capacity (0.0 - 1.0)
    pub fn occupancy(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.size as f64 / self.max_size as f64
        }
    }
}
