//! Cache Entry Types
//!
//! Per-entry bookkeeping: expiry deadline, access recency and frequency, and
//! the insertion sequence used for FIFO victim selection.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single cache entry with value and access metadata
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Expiration timestamp (epoch milliseconds), None = no expiry
    pub expires_at: Option<u64>,
    /// Last access timestamp (epoch milliseconds)
    pub last_access: u64,
    /// Number of successful reads since insertion
    pub access_count: u64,
    /// Monotonic insertion sequence, assigned by the store
    pub seq: u64,
    /// Tags attached to this entry
    pub tags: HashSet<String>,
}

impl<V> CacheEntry<V> {
    /// Create a new entry with optional TTL
    pub fn new(value: V, ttl_seconds: u64, seq: u64) -> Self {
        let now = epoch_millis();
        let expires_at = if ttl_seconds > 0 {
            Some(now + ttl_seconds * 1000)
        } else {
            None
        };
        Self {
            value,
            expires_at,
            last_access: now,
            access_count: 0,
            seq,
            tags: HashSet::new(),
        }
    }

    /// Check if the entry has expired
    ///
    /// An entry with no deadline never expires. Otherwise it is expired once
    /// the current time passes the deadline.
    #[inline]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => epoch_millis() > deadline,
            None => false,
        }
    }

    /// Record a successful read
    #[inline]
    pub fn record_access(&mut self) {
        self.last_access = epoch_millis();
        self.access_count += 1;
    }
}

/// Current Unix timestamp in milliseconds
#[inline]
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Fast non-cryptographic hash (FxHash algorithm)
///
/// Used for cache-key fingerprints where collision resistance against an
/// adversary is not required.
#[inline]
pub fn fx_hash(bytes: &[u8]) -> u64 {
    const SEED: u64 = 0x517cc1b727220a95;
    let mut hash = SEED;
    for &byte in bytes {
        hash = hash.rotate_left(5) ^ (byte as u64);
        hash = hash.wrapping_mul(SEED);
    }
    hash
}
