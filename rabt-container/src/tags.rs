//! Tagged collections and multi-binding registrations.
//!
//! The tag map is bidirectional and insertion-ordered: a tag lists
//! its member identifiers in first-insertion order with duplicates
//! coalesced, and an identifier knows the tags it carries.
//! Multi-bindings are the explicit half of `resolve_all`: per
//! identifier, an ordered list of `(priority, concrete)` entries.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use tracing::debug;

use crate::registry::Concrete;

/// One explicit multi-binding entry.
#[derive(Clone)]
pub struct MultiBinding {
    pub priority: i32,
    seq: u64,
    pub concrete: Concrete,
}

/// Bidirectional tag map plus multi-binding lists.
pub struct TagRegistry {
    by_tag: RwLock<IndexMap<String, IndexSet<String>>>,
    by_id: RwLock<IndexMap<String, IndexSet<String>>>,
    multi: RwLock<IndexMap<String, Vec<MultiBinding>>>,
    seq: RwLock<u64>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self {
            by_tag: RwLock::new(IndexMap::new()),
            by_id: RwLock::new(IndexMap::new()),
            multi: RwLock::new(IndexMap::new()),
            seq: RwLock::new(0),
        }
    }

    /// Adds every `(id, tag)` pair to both directions of the map.
    /// Duplicates coalesce; first-insertion order is preserved.
    pub fn tag(&self, ids: &[&str], tags: &[&str]) {
        let mut by_tag = self.by_tag.write();
        let mut by_id = self.by_id.write();
        for &tag in tags {
            let members = by_tag.entry(tag.to_string()).or_default();
            for &id in ids {
                members.insert(id.to_string());
            }
        }
        for &id in ids {
            let carried = by_id.entry(id.to_string()).or_default();
            for &tag in tags {
                carried.insert(tag.to_string());
            }
        }
        debug!(ids = ?ids, tags = ?tags, "Tagged identifiers");
    }

    /// Member identifiers of `tag`, insertion order.
    pub fn tagged_ids(&self, tag: &str) -> Vec<String> {
        self.by_tag
            .read()
            .get(tag)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tags carried by `id`, insertion order.
    pub fn tags_of(&self, id: &str) -> Vec<String> {
        self.by_id
            .read()
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True if `id` is a member of any tag. The compiler refuses to
    /// compile tagged top-level entries.
    pub fn is_tagged(&self, id: &str) -> bool {
        self.by_id
            .read()
            .get(id)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }

    /// Registers an explicit multi-binding for `id`.
    pub fn add_multi_binding(&self, id: &str, concrete: Concrete, priority: i32) {
        let seq = {
            let mut seq = self.seq.write();
            *seq += 1;
            *seq
        };
        self.multi
            .write()
            .entry(id.to_string())
            .or_default()
            .push(MultiBinding {
                priority,
                seq,
                concrete,
            });
        debug!(id, priority, "Registered multi-binding");
    }

    /// Multi-bindings for `id`, descending priority, ties broken by
    /// insertion order.
    pub fn multi_bindings(&self, id: &str) -> Vec<MultiBinding> {
        let mut entries = self
            .multi
            .read()
            .get(id)
            .cloned()
            .unwrap_or_default();
        entries.sort_by_key(|e| (std::cmp::Reverse(e.priority), e.seq));
        entries
    }

    pub fn has_multi(&self, id: &str) -> bool {
        self.multi
            .read()
            .get(id)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagRegistry")
            .field("tags", &self.by_tag.read().len())
            .field("tagged_ids", &self.by_id.read().len())
            .field("multi", &self.multi.read().len())
            .finish()
    }
}
