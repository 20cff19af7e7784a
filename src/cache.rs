use lru::LruCache;
use serde::Serialize;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Entry count and hit/miss counters for one cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// A bounded cache where successful lookups mark the entry most-recently-used
/// and inserts evict the least-recently-used entry when over capacity.
///
/// Capacity is fixed at construction; capacity 0 disables the cache, turning
/// both operations into no-ops that always miss. Not thread-safe on its own —
/// the reader serializes access under its own locks.
pub struct PromotingCache<K: Hash + Eq, V: Clone> {
    inner: Option<LruCache<K, V>>,
    hits: u64,
    misses: u64,
}

impl<K: Hash + Eq, V: Clone> PromotingCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        PromotingCache {
            inner: NonZeroUsize::new(capacity).map(LruCache::new),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up `key`, promoting it to most-recently-used on a hit.
    pub fn get_and_promote(&mut self, key: &K) -> Option<V> {
        let Some(inner) = self.inner.as_mut() else {
            self.misses += 1;
            return None;
        };
        match inner.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert or replace `key`, evicting the least-recently-used entry when
    /// over capacity. The inserted entry becomes most-recently-used.
    pub fn put(&mut self, key: K, value: V) {
        if let Some(inner) = self.inner.as_mut() {
            inner.put(key, value);
        }
    }

    pub fn clear(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.as_ref().map(LruCache::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.as_ref().map(|c| c.cap().get()).unwrap_or(0)
    }

    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            entries: self.len(),
            capacity: self.capacity(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}
