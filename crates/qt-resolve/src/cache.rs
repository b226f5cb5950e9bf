use std::collections::HashMap;
use std::sync::Arc;

use qt_object::Object;
use qt_types::ObjectName;

/// Caller-owned memo of fetched objects.
///
/// A name maps to `Some(object)` or to `None` when the store reported it
/// missing. Reusing a cache across calls never re-fetches a known name.
/// Not synchronized: one cache per concurrent caller.
#[derive(Debug, Default)]
pub struct ObjectCache {
    entries: HashMap<ObjectName, Option<Arc<Object>>>,
    fetched: usize,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if unknown, `Some(None)` if known missing.
    pub fn get(&self, name: &ObjectName) -> Option<Option<Arc<Object>>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &ObjectName) -> bool {
        self.entries.contains_key(name)
    }

    pub(crate) fn record(&mut self, name: ObjectName, object: Option<Object>) {
        self.fetched += 1;
        self.entries.insert(name, object.map(Arc::new));
    }

    /// Seed the cache, e.g. with objects parsed but not yet stored.
    pub fn insert(&mut self, object: Object) {
        self.entries.insert(object.name().clone(), Some(Arc::new(object)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of names fetched from the store through this cache.
    pub fn fetch_count(&self) -> usize {
        self.fetched
    }
}
