//! Process-wide caches for everything the engine resolves: templates,
//! elements, output formats and knowledge base lookups. All four are filled
//! on first read and retained until [CacheManager::clear]. Concurrent misses
//! for the same key may compute redundantly; the last published value wins,
//! which is sound because every loader is pure.

use crate::{element::FormatElement, outputs::OutputFormat, store::KbStore, templates::FormatTemplate};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// A read-mostly concurrent map. Values are published in `Arc`s so readers
/// never block on a clone.
#[derive(Debug)]
pub(crate) struct Cache<V> {
    map: RwLock<HashMap<String, Arc<V>>>,
}

impl<V> Cache<V> {
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.map
            .read()
            .expect("cache lock poisoned")
            .get(key)
            .map(Arc::clone)
    }

    /// Publish a value, replacing any previous entry for the key, and return
    /// the published handle
    pub fn insert(&self, key: String, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.map
            .write()
            .expect("cache lock poisoned")
            .insert(key, Arc::clone(&value));
        value
    }

    pub fn clear(&self) {
        self.map.write().expect("cache lock poisoned").clear();
    }
}

// Manual impl; deriving would bound V: Default
impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }
}

/// The engine's four caches. One instance per engine; dropping the engine
/// drops every cached artifact.
#[derive(Debug, Default)]
pub(crate) struct CacheManager {
    /// Format templates by filename
    pub templates: Cache<FormatTemplate>,
    /// Format elements by uppercased resolution key
    pub elements: Cache<FormatElement>,
    /// Output formats by filename
    pub outputs: Cache<OutputFormat>,
    /// Knowledge base values by (kb, key). Missing values are cached too so
    /// a repeated miss doesn't hit the store again.
    kb: RwLock<HashMap<String, HashMap<String, Option<String>>>>,
}

impl CacheManager {
    /// Look up a knowledge base value, caching hit or miss per (kb, key)
    pub fn kb_lookup(&self, store: &dyn KbStore, kb: &str, key: &str) -> Option<String> {
        if let Some(cached) = self
            .kb
            .read()
            .expect("cache lock poisoned")
            .get(kb)
            .and_then(|mappings| mappings.get(key))
        {
            return cached.clone();
        }
        let value = store.get(kb, key);
        self.kb
            .write()
            .expect("cache lock poisoned")
            .entry(kb.to_owned())
            .or_default()
            .insert(key.to_owned(), value.clone());
        value
    }

    /// Drop everything from all four caches
    pub fn clear(&self) {
        self.templates.clear();
        self.elements.clear();
        self.outputs.clear();
        self.kb.write().expect("cache lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::MemKbStore;

    #[test]
    fn test_cache_replaces_on_insert() {
        let cache: Cache<String> = Cache::default();
        assert_eq!(cache.get("key"), None);
        cache.insert("key".into(), "first".into());
        cache.insert("key".into(), "second".into());
        assert_eq!(cache.get("key").as_deref(), Some(&"second".to_owned()));
    }

    #[test]
    fn test_kb_lookup_caches_hits_and_misses() {
        let store = MemKbStore::new([(("dbcollid2coll", "ARTICLE"), "Published Article")]);
        let caches = CacheManager::default();

        assert_eq!(
            caches.kb_lookup(&store, "dbcollid2coll", "ARTICLE").as_deref(),
            Some("Published Article")
        );
        assert_eq!(caches.kb_lookup(&store, "dbcollid2coll", "MISSING"), None);
        // Cached: no further store traffic for either key
        caches.kb_lookup(&store, "dbcollid2coll", "ARTICLE");
        caches.kb_lookup(&store, "dbcollid2coll", "MISSING");
        assert_eq!(store.hits(), 2);

        caches.clear();
        caches.kb_lookup(&store, "dbcollid2coll", "ARTICLE");
        assert_eq!(store.hits(), 3);
    }
}
