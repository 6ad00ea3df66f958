//! Cache Invalidation
//!
//! Routes change events to the caches they affect. Two mechanisms run on
//! every event: a dependency graph mapping invalidation types to registered
//! cache names, and glob patterns matched against the event identity with a
//! handler per pattern. Both registries are append-only.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::manager::CacheManager;
use crate::metadata::subject_tag;
use crate::result::table_tag;

/// Convert a `*`/`?` glob into an anchored regex.
pub fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            ch => pattern.push_str(&regex::escape(ch.encode_utf8(&mut [0u8; 4]))),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|err| Error::InvalidPattern {
        pattern: glob.to_string(),
        reason: err.to_string(),
    })
}

/// What changed, as far as the event source knows.
///
/// An empty context carries no scoping information, so dependent caches are
/// cleared wholesale.
#[derive(Debug, Clone, Default)]
pub struct InvalidationContext {
    pub entity: Option<String>,
    pub tables: Vec<String>,
    pub tags: Vec<String>,
}

impl InvalidationContext {
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            tables: vec![table.into()],
            ..Self::default()
        }
    }

    pub fn for_entity(entity: impl Into<String>) -> Self {
        Self {
            entity: Some(entity.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entity.is_none() && self.tables.is_empty() && self.tags.is_empty()
    }
}

/// Callback invoked when an event identity matches a registered pattern
pub type PatternHandler =
    Arc<dyn Fn(&str, &str, &InvalidationContext, &CacheInvalidator) + Send + Sync>;

struct PatternEntry {
    glob: String,
    regex: Regex,
    handler: PatternHandler,
}

#[derive(Default)]
pub struct CacheInvalidator {
    dependencies: RwLock<HashMap<String, Vec<String>>>,
    patterns: RwLock<Vec<PatternEntry>>,
}

impl CacheInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register cache names that depend on an invalidation type. Repeated
    /// calls append; duplicates are dropped.
    pub fn add_dependency(&self, invalidation_type: &str, caches: &[String]) {
        let mut deps = self.dependencies.write();
        let entry = deps.entry(invalidation_type.to_string()).or_default();
        for cache in caches {
            if !entry.contains(cache) {
                entry.push(cache.clone());
            }
        }
    }

    /// Cache names registered under an invalidation type
    pub fn dependents(&self, invalidation_type: &str) -> Vec<String> {
        self.dependencies
            .read()
            .get(invalidation_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Register a handler for event identities matching the glob.
    pub fn on_pattern(
        &self,
        glob: &str,
        handler: impl Fn(&str, &str, &InvalidationContext, &CacheInvalidator) + Send + Sync + 'static,
    ) -> Result<()> {
        let regex = glob_to_regex(glob)?;
        self.patterns.write().push(PatternEntry {
            glob: glob.to_string(),
            regex,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.read().len()
    }

    /// Process a change event.
    ///
    /// First the dependency cascade: every cache registered under the
    /// invalidation type gets its `subject:<entity>`, `table:<t>` and
    /// explicit tags invalidated, or is cleared outright when the context
    /// carries no scope. Then the
    /// event identity (`type` or `type:entity`) is matched against every
    /// pattern and the handlers of the matches run. Handlers run without any
    /// registry lock held.
    pub fn invalidate(
        &self,
        manager: &CacheManager,
        invalidation_type: &str,
        operation: &str,
        ctx: &InvalidationContext,
    ) -> usize {
        let mut removed = 0;
        let dependents = self.dependents(invalidation_type);
        for name in &dependents {
            let Some(cache) = manager.get_cache(name) else {
                continue;
            };
            if ctx.is_empty() {
                cache.clear();
                debug!(cache = %name, invalidation_type, "cleared (unscoped event)");
                continue;
            }
            if let Some(entity) = &ctx.entity {
                removed += cache.invalidate_tag(&subject_tag(entity));
            }
            for table in &ctx.tables {
                removed += cache.invalidate_tag(&table_tag(table));
            }
            for tag in &ctx.tags {
                removed += cache.invalidate_tag(tag);
            }
        }

        let identity = match &ctx.entity {
            Some(entity) => format!("{}:{}", invalidation_type, entity),
            None => invalidation_type.to_string(),
        };
        let matching: Vec<PatternHandler> = {
            let patterns = self.patterns.read();
            patterns
                .iter()
                .filter(|p| p.regex.is_match(&identity))
                .map(|p| Arc::clone(&p.handler))
                .collect()
        };
        for handler in &matching {
            handler(&identity, operation, ctx, self);
        }

        info!(
            invalidation_type,
            operation,
            identity = %identity,
            removed,
            handlers = matching.len(),
            "invalidation processed"
        );
        removed
    }
}

impl std::fmt::Debug for CacheInvalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInvalidator")
            .field("dependencies", &*self.dependencies.read())
            .field(
                "patterns",
                &self
                    .patterns
                    .read()
                    .iter()
                    .map(|p| p.glob.clone())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
