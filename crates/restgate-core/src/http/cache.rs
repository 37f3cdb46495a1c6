//! Overwrite-only cache for read requests
//!
//! Entries are keyed by the exact route path, ids and query string included,
//! and never expire. A value is replaced only when the same route is fetched
//! again or the entry is explicitly invalidated.

use std::collections::HashMap;

use parking_lot::RwLock;

#[derive(Debug)]
pub struct ResponseCache<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ResponseCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, route: &str) -> Option<V> {
        self.entries.read().get(route).cloned()
    }

    /// Store a value, returning the one it replaced
    pub fn insert(&self, route: impl Into<String>, value: V) -> Option<V> {
        self.entries.write().insert(route.into(), value)
    }

    pub fn invalidate(&self, route: &str) -> Option<V> {
        self.entries.write().remove(route)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
