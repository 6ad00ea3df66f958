//! Entity Metadata Cache
//!
//! Caches per-subject schema metadata (table name, field mappings, primary
//! key, relations, reflection blob) read through from a `MetadataSource`.
//! Entries never expire; they are dropped only through explicit
//! invalidation.
//!
//! Population writes the warmed marker last, so a subject observed as warm
//! has all of its component keys in place.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, EvictionPolicy};
use crate::engine::{CacheStatsSnapshot, MemoryCache};
use crate::error::{Error, Result};

/// Tag shared by every metadata entry
pub const METADATA_TAG: &str = "entity-metadata";

/// A relation from one subject to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub field: String,
    pub target: String,
    pub kind: RelationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// Schema metadata for one subject, as produced by a `MetadataSource`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectMetadata {
    pub table_name: String,
    /// Logical field name to storage column name
    pub field_mappings: HashMap<String, String>,
    pub primary_key: String,
    pub relations: Vec<Relation>,
    /// Opaque reflection payload carried for callers that need the raw shape
    pub reflection: serde_json::Value,
}

/// Authority the cache reads through to on a miss
pub trait MetadataSource: Send + Sync {
    fn lookup(&self, subject: &str) -> Result<SubjectMetadata>;
}

/// One cached component of a subject's metadata
#[derive(Debug, Clone)]
pub enum MetadataValue {
    Table(String),
    Fields(HashMap<String, String>),
    PrimaryKey(String),
    Relations(Vec<Relation>),
    Reflection(serde_json::Value),
    Warmed,
}

// ============================================================
// Cache
// ============================================================

pub struct MetadataCache {
    store: MemoryCache<MetadataValue>,
    source: Arc<dyn MetadataSource>,
}

/// Tag scoping metadata entries to one subject
pub fn subject_tag(subject: &str) -> String {
    format!("subject:{}", subject)
}

fn component_key(subject: &str, component: &str) -> String {
    format!("meta:{}:{}", subject, component)
}

impl MetadataCache {
    /// Create a metadata cache bounded at `max_size` component entries.
    /// Entries carry no TTL.
    pub fn new(max_size: usize, source: Arc<dyn MetadataSource>) -> Result<Self> {
        let config = CacheConfig::new(max_size, 0, EvictionPolicy::Lru)?;
        Ok(Self {
            store: MemoryCache::new(config),
            source,
        })
    }

    // == Population ==

    /// Store every component of a subject, warmed marker last.
    pub fn populate(&self, subject: &str, metadata: &SubjectMetadata) {
        let tags = vec![METADATA_TAG.to_string(), subject_tag(subject)];
        let components: [(&str, MetadataValue); 5] = [
            ("table", MetadataValue::Table(metadata.table_name.clone())),
            ("fields", MetadataValue::Fields(metadata.field_mappings.clone())),
            ("pk", MetadataValue::PrimaryKey(metadata.primary_key.clone())),
            ("relations", MetadataValue::Relations(metadata.relations.clone())),
            ("reflection", MetadataValue::Reflection(metadata.reflection.clone())),
        ];
        for (component, value) in components {
            let key = component_key(subject, component);
            self.store.set(key.clone(), value);
            self.store.tag(&key, &tags);
        }
        let warmed_key = component_key(subject, "warmed");
        self.store.set(warmed_key.clone(), MetadataValue::Warmed);
        self.store.tag(&warmed_key, &tags);
        debug!(subject, "metadata populated");
    }

    /// Whether the subject's warmed marker is present
    pub fn is_warmed_up(&self, subject: &str) -> bool {
        self.store.has(&component_key(subject, "warmed"))
    }

    /// Populate every listed subject from the source, skipping subjects that
    /// are already warm. Fails on the first source error, leaving earlier
    /// subjects populated.
    pub fn warm_up(&self, subjects: &[String]) -> Result<usize> {
        let mut loaded = 0;
        for subject in subjects {
            if self.is_warmed_up(subject) {
                continue;
            }
            let metadata = match self.source.lookup(subject) {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(subject, error = %err, "metadata warm-up failed");
                    return Err(err);
                }
            };
            self.populate(subject, &metadata);
            loaded += 1;
        }
        info!(loaded, total = subjects.len(), "metadata warm-up complete");
        Ok(loaded)
    }

    // == Read-through accessors ==

    pub fn table_name(&self, subject: &str) -> Result<String> {
        match self.store.get(&component_key(subject, "table")) {
            Some(MetadataValue::Table(name)) => Ok(name),
            _ => Ok(self.load(subject)?.table_name),
        }
    }

    pub fn field_mappings(&self, subject: &str) -> Result<HashMap<String, String>> {
        match self.store.get(&component_key(subject, "fields")) {
            Some(MetadataValue::Fields(fields)) => Ok(fields),
            _ => Ok(self.load(subject)?.field_mappings),
        }
    }

    pub fn primary_key(&self, subject: &str) -> Result<String> {
        match self.store.get(&component_key(subject, "pk")) {
            Some(MetadataValue::PrimaryKey(pk)) => Ok(pk),
            _ => Ok(self.load(subject)?.primary_key),
        }
    }

    pub fn relations(&self, subject: &str) -> Result<Vec<Relation>> {
        match self.store.get(&component_key(subject, "relations")) {
            Some(MetadataValue::Relations(relations)) => Ok(relations),
            _ => Ok(self.load(subject)?.relations),
        }
    }

    pub fn reflection(&self, subject: &str) -> Result<serde_json::Value> {
        match self.store.get(&component_key(subject, "reflection")) {
            Some(MetadataValue::Reflection(value)) => Ok(value),
            _ => Ok(self.load(subject)?.reflection),
        }
    }

    /// Miss path: fetch from the source and repopulate the whole subject
    fn load(&self, subject: &str) -> Result<SubjectMetadata> {
        let metadata = self.source.lookup(subject).map_err(|err| match err {
            Error::MetadataSource { .. } => err,
            other => Error::MetadataSource {
                subject: subject.to_string(),
                reason: other.to_string(),
            },
        })?;
        self.populate(subject, &metadata);
        Ok(metadata)
    }

    // == Invalidation ==

    /// Drop every component of one subject; returns the entry count removed
    pub fn invalidate_subject(&self, subject: &str) -> usize {
        self.store.invalidate_tag(&subject_tag(subject))
    }

    /// Drop all metadata entries
    pub fn invalidate_all(&self) -> usize {
        self.store.invalidate_tag(METADATA_TAG)
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

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        self.store.snapshot()
    }

    pub(crate) fn store(&self) -> &MemoryCache<MetadataValue> {
        &self.store
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Deterministic source for tests; fails for the subject "broken"
    pub(crate) struct StaticSource {
        lookups: AtomicUsize,
    }

    impl StaticSource {
        pub(crate) fn new() -> Self {
            Self {
                lookups: AtomicUsize::new(0),
            }
        }

        pub(crate) fn lookup_count(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    impl MetadataSource for StaticSource {
        fn lookup(&self, subject: &str) -> Result<SubjectMetadata> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if subject == "broken" {
                return Err(Error::MetadataSource {
                    subject: subject.to_string(),
                    reason: "no such subject".to_string(),
                });
            }
            Ok(SubjectMetadata {
                table_name: format!("tbl_{}", subject),
                field_mappings: HashMap::from([("id".to_string(), "id".to_string())]),
                primary_key: "id".to_string(),
                relations: vec![Relation {
                    field: "owner".to_string(),
                    target: "user".to_string(),
                    kind: RelationKind::ManyToOne,
                }],
                reflection: serde_json::json!({"subject": subject}),
            })
        }
    }
}
