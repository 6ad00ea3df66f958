//! Property Tests for the Cache Engine
//!
//! Random operation sequences checking the structural invariants: the store
//! never exceeds its configured bound, and the tag index stays mutually
//! inverse under arbitrary interleavings of set / delete / tag / invalidate.

use proptest::prelude::*;

use super::store::MemoryCache;
use super::tags::TagIndex;
use crate::config::{CacheConfig, EvictionPolicy};

#[derive(Debug, Clone)]
enum Op {
    Set(u8),
    Get(u8),
    Delete(u8),
    Tag(u8, u8),
    InvalidateTag(u8),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u8>().prop_map(Op::Set),
        3 => any::<u8>().prop_map(Op::Get),
        2 => any::<u8>().prop_map(Op::Delete),
        2 => (any::<u8>(), 0u8..8).prop_map(|(k, t)| Op::Tag(k, t)),
        1 => (0u8..8).prop_map(Op::InvalidateTag),
        1 => Just(Op::Clear),
    ]
}

fn policy_strategy() -> impl Strategy<Value = EvictionPolicy> {
    prop_oneof![
        Just(EvictionPolicy::Lru),
        Just(EvictionPolicy::Lfu),
        Just(EvictionPolicy::Fifo),
    ]
}

fn apply(cache: &MemoryCache<u64>, op: &Op) {
    match op {
        Op::Set(k) => cache.set(format!("k{}", k), u64::from(*k)),
        Op::Get(k) => {
            cache.get(&format!("k{}", k));
        }
        Op::Delete(k) => {
            cache.delete(&format!("k{}", k));
        }
        Op::Tag(k, t) => {
            cache.tag(&format!("k{}", k), &[format!("t{}", t)]);
        }
        Op::InvalidateTag(t) => {
            cache.invalidate_tag(&format!("t{}", t));
        }
        Op::Clear => cache.clear(),
    }
}

proptest! {
    #[test]
    fn prop_size_never_exceeds_bound(
        max_size in 1usize..16,
        policy in policy_strategy(),
        ops in prop::collection::vec(op_strategy(), 0..200),
    ) {
        let cache = MemoryCache::new(CacheConfig::new(max_size, 0, policy).unwrap());
        for op in &ops {
            apply(&cache, op);
            prop_assert!(cache.len() <= max_size);
        }
    }

    #[test]
    fn prop_tag_index_stays_consistent(
        policy in policy_strategy(),
        ops in prop::collection::vec(op_strategy(), 0..200),
    ) {
        let cache = MemoryCache::new(CacheConfig::new(8, 0, policy).unwrap());
        for op in &ops {
            apply(&cache, op);
        }
        prop_assert!(cache.tag_index_consistent());
    }

    #[test]
    fn prop_invalidated_tag_leaves_no_keys(
        ops in prop::collection::vec(op_strategy(), 0..100),
        tag in 0u8..8,
    ) {
        let cache = MemoryCache::new(CacheConfig::new(8, 0, EvictionPolicy::Lru).unwrap());
        for op in &ops {
            apply(&cache, op);
        }
        let tag = format!("t{}", tag);
        cache.invalidate_tag(&tag);
        prop_assert!(!cache.has_tag(&tag));
    }

    #[test]
    fn prop_raw_index_mutual_inverse(
        inserts in prop::collection::vec((0u8..32, prop::collection::vec(0u8..8, 0..4)), 0..64),
        removes in prop::collection::vec(0u8..32, 0..32),
    ) {
        let mut index = TagIndex::new();
        for (key, tags) in &inserts {
            let tags: Vec<String> = tags.iter().map(|t| format!("t{}", t)).collect();
            index.insert(&format!("k{}", key), &tags);
        }
        for key in &removes {
            index.remove_key(&format!("k{}", key));
        }
        prop_assert!(index.is_consistent());
    }
}
