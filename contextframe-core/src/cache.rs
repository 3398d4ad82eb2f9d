// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The ContextFrame Authors

//! A shared, size-bounded cache for decoded index pages and manifests.
//!
//! This mirrors the teacher's `LanceCache`: an LRU with an optional TTL,
//! sized in entry count rather than bytes, shared across readers of the
//! same dataset handle.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

/// Configuration for a [`FrameCache`].
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1 << 16,
            ttl: None,
        }
    }
}

/// A generic in-memory cache keyed by an opaque string key.
///
/// Used for decoded vector-index partition pages and parsed manifests.
/// Entries are evicted by an approximate-LRU policy; callers should treat
/// a miss as "recompute", never as an error.
#[derive(Clone)]
pub struct FrameCache<V: Clone + Send + Sync + 'static> {
    inner: Cache<String, Arc<V>>,
}

impl<V: Clone + Send + Sync + 'static> std::fmt::Debug for FrameCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCache")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

impl<V: Clone + Send + Sync + 'static> FrameCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_entries);
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            inner: builder.build(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.inner.insert(key.into(), Arc::new(value));
    }

    pub fn get_or_insert_with(&self, key: impl AsRef<str>, f: impl FnOnce() -> V) -> Arc<V> {
        if let Some(hit) = self.inner.get(key.as_ref()) {
            return hit;
        }
        let value = Arc::new(f());
        self.inner.insert(key.as_ref().to_string(), value.clone());
        value
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }

    pub fn len(&self) -> u64 {
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A cache keyed by an arbitrary hashable key rather than a string; used
/// where the natural key is a `(fragment_id, column_id)` pair instead of a
/// formatted string.
#[derive(Clone)]
pub struct KeyedCache<K: Hash + Eq + Send + Sync + 'static, V: Clone + Send + Sync + 'static> {
    inner: Cache<K, Arc<V>>,
}

impl<K: Hash + Eq + Send + Sync + Clone + 'static, V: Clone + Send + Sync + 'static>
    KeyedCache<K, V>
{
    pub fn new(config: CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_entries);
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            inner: builder.build(),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.insert(key, Arc::new(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_roundtrip() {
        let cache: FrameCache<String> = FrameCache::new(CacheConfig::default());
        cache.insert("a", "hello".to_string());
        assert_eq!(cache.get("a").map(|v| (*v).clone()), Some("hello".to_string()));
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn get_or_insert_with_computes_once() {
        let cache: FrameCache<u32> = FrameCache::new(CacheConfig::default());
        let calls = std::sync::atomic::AtomicU32::new(0);
        let compute = || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            42
        };
        let v1 = cache.get_or_insert_with("k", compute);
        let v2 = cache.get_or_insert_with("k", compute);
        assert_eq!(*v1, 42);
        assert_eq!(*v2, 42);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
