//! Tag Index
//!
//! Bidirectional index between tags and cache keys, enabling bulk
//! invalidation in time proportional to the tag's key set rather than a full
//! scan.
//!
//! Invariant: the two maps are mutual inverses. A key appears under tag `t`
//! in `tag_to_keys` iff `t` appears under that key in `key_to_tags`. Empty
//! tag buckets are removed entirely.

use std::collections::{HashMap, HashSet};

/// Bidirectional tag -> keys / key -> tags index
#[derive(Debug, Default)]
pub struct TagIndex {
    tag_to_keys: HashMap<String, HashSet<String>>,
    key_to_tags: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach tags to a key, unioning with any existing tags
    pub fn insert(&mut self, key: &str, tags: &[String]) {
        if tags.is_empty() {
            return;
        }
        let key_tags = self.key_to_tags.entry(key.to_string()).or_default();
        for tag in tags {
            key_tags.insert(tag.clone());
            self.tag_to_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Remove a key from both directions, pruning empty tag buckets
    pub fn remove_key(&mut self, key: &str) {
        if let Some(tags) = self.key_to_tags.remove(key) {
            for tag in tags {
                if let Some(keys) = self.tag_to_keys.get_mut(&tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.tag_to_keys.remove(&tag);
                    }
                }
            }
        }
    }

    /// Keys currently filed under a tag
    pub fn keys_for(&self, tag: &str) -> Vec<String> {
        self.tag_to_keys
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tags currently attached to a key
    pub fn tags_for(&self, key: &str) -> Vec<String> {
        self.key_to_tags
            .get(key)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct tags
    pub fn tag_count(&self) -> usize {
        self.tag_to_keys.len()
    }

    /// Whether any key is filed under the tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag_to_keys.contains_key(tag)
    }

    pub fn clear(&mut self) {
        self.tag_to_keys.clear();
        self.key_to_tags.clear();
    }

    /// Verify the mutual-inverse invariant (test / diagnostics helper)
    pub fn is_consistent(&self) -> bool {
        for (tag, keys) in &self.tag_to_keys {
            if keys.is_empty() {
                return false;
            }
            for key in keys {
                match self.key_to_tags.get(key) {
                    Some(tags) if tags.contains(tag) => {}
                    _ => return false,
                }
            }
        }
        for (key, tags) in &self.key_to_tags {
            for tag in tags {
                match self.tag_to_keys.get(tag) {
                    Some(keys) if keys.contains(key) => {}
                    _ => return false,
                }
            }
        }
        true
    }
}
