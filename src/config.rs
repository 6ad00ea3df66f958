//! Cache configuration
//!
//! Immutable configuration values for a cache instance. The eviction policy
//! name is validated at construction; a config never holds an unrecognized
//! policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Eviction Policy
// =============================================================================

/// Rule used to choose a victim entry when a full cache must admit a new key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Evict the entry with the oldest last-access time
    Lru,
    /// Evict the entry with the smallest access count
    Lfu,
    /// Evict the earliest-remaining inserted entry
    Fifo,
}

impl EvictionPolicy {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
        }
    }

    /// Get list of recognized policies
    pub fn all() -> [Self; 3] {
        [Self::Lru, Self::Lfu, Self::Fifo]
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::Lru
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EvictionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            other => Err(Error::UnknownPolicy(other.to_string())),
        }
    }
}

// =============================================================================
// Cache Configuration
// =============================================================================

/// Configuration for a cache instance
///
/// Immutable after construction. `ttl_seconds == 0` means entries never
/// expire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold
    pub max_size: usize,
    /// Default TTL in seconds (0 = no expiry)
    pub ttl_seconds: u64,
    /// Whether hit/miss statistics are recorded
    pub enable_stats: bool,
    /// Eviction policy used when inserting into a full cache
    pub eviction_policy: EvictionPolicy,
}

impl CacheConfig {
    /// Create a validated configuration
    ///
    /// Fails with [`Error::InvalidConfig`] when `max_size` is zero.
    pub fn new(max_size: usize, ttl_seconds: u64, eviction_policy: EvictionPolicy) -> Result<Self> {
        if max_size == 0 {
            return Err(Error::InvalidConfig(
                "max_size must be positive".to_string(),
            ));
        }
        Ok(Self {
            max_size,
            ttl_seconds,
            enable_stats: true,
            eviction_policy,
        })
    }

    /// Create a configuration from a policy name, validating the name
    pub fn with_policy_name(max_size: usize, ttl_seconds: u64, policy: &str) -> Result<Self> {
        Self::new(max_size, ttl_seconds, policy.parse()?)
    }

    /// Disable statistics recording
    pub fn without_stats(mut self) -> Self {
        self.enable_stats = false;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl_seconds: 300,
            enable_stats: true,
            eviction_policy: EvictionPolicy::Lru,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_policy_parse() {
        assert_eq!("lru".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lru);
        assert_eq!("LFU".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lfu);
        assert_eq!("Fifo".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Fifo);
    }

    #[test]
    fn test_policy_parse_unknown() {
        let err = "mru".parse::<EvictionPolicy>().unwrap_err();
        assert_matches!(err, Error::UnknownPolicy(name) if name == "mru");
    }

    #[test]
    fn test_policy_names() {
        for policy in EvictionPolicy::all() {
            assert_eq!(policy.name().parse::<EvictionPolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn test_config_validation() {
        let config = CacheConfig::new(100, 60, EvictionPolicy::Lru).unwrap();
        assert_eq!(config.max_size, 100);
        assert_eq!(config.ttl_seconds, 60);
        assert!(config.enable_stats);

        let err = CacheConfig::new(0, 60, EvictionPolicy::Lru).unwrap_err();
        assert_matches!(err, Error::InvalidConfig(_));
    }

    #[test]
    fn test_config_with_policy_name() {
        let config = CacheConfig::with_policy_name(10, 0, "fifo").unwrap();
        assert_eq!(config.eviction_policy, EvictionPolicy::Fifo);
        assert_eq!(config.ttl_seconds, 0);

        assert!(CacheConfig::with_policy_name(10, 0, "random").is_err());
    }

    #[test]
    fn test_config_without_stats() {
        let config = CacheConfig::default().without_stats();
        assert!(!config.enable_stats);
    }
}
