//! Memory Store Module
//!
//! Cost-bounded, least-recently-used map from key to decoded image.
//!
//! Recency is updated by `set` and by every `get` hit. When the total cost
//! exceeds the limit, entries are evicted least-recently-used first until
//! the store is back under budget. An entry whose own cost exceeds the
//! limit is therefore dropped right after insertion.
//!
//! While a disk removal of a key is queued, images read back from disk for
//! that key are not cached (see [`MemoryStore::begin_removal`]). Callers'
//! own `set`s are always accepted.

use std::collections::HashMap;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::MemoryEntry;

// == Memory Store ==
/// Thread-safe memory tier shared by callers and the disk lane.
#[derive(Debug)]
pub struct MemoryStore<V> {
    inner: Mutex<MemoryInner<V>>,
    /// Total cost allowed, None = unbounded
    cost_limit: Option<usize>,
}

#[derive(Debug)]
struct MemoryInner<V> {
    entries: LruCache<String, MemoryEntry<V>>,
    total_cost: usize,
    /// Keys with queued disk removals, by number of removals in flight
    pending_removals: HashMap<String, usize>,
}

impl<V> MemoryInner<V> {
    fn insert(&mut self, key: String, value: V, cost: usize, cost_limit: Option<usize>) -> usize {
        if let Some(previous) = self.entries.put(key, MemoryEntry::new(value, cost)) {
            self.total_cost -= previous.cost;
        }
        self.total_cost += cost;

        let mut evicted = 0;
        if let Some(limit) = cost_limit {
            while self.total_cost > limit {
                match self.entries.pop_lru() {
                    Some((evicted_key, entry)) => {
                        self.total_cost -= entry.cost;
                        evicted += 1;
                        debug!(key = %evicted_key, cost = entry.cost, "Evicted memory entry");
                    }
                    None => break,
                }
            }
        }
        evicted
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.total_cost -= entry.cost;
                true
            }
            None => false,
        }
    }
}

impl<V: Clone> MemoryStore<V> {
    // == Constructor ==
    /// Creates an empty store with an optional total-cost limit.
    pub fn new(cost_limit: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                entries: LruCache::unbounded(),
                total_cost: 0,
                pending_removals: HashMap::new(),
            }),
            cost_limit,
        }
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// Returns the number of entries evicted to honour the cost limit.
    pub fn set(&self, key: String, value: V, cost: usize) -> usize {
        self.inner.lock().insert(key, value, cost, self.cost_limit)
    }

    // == Populate ==
    /// Caches an image read back from disk.
    ///
    /// Returns None without caching when a disk removal of `key` is queued,
    /// otherwise the number of evicted entries.
    pub fn populate(&self, key: String, value: V, cost: usize) -> Option<usize> {
        let mut inner = self.inner.lock();
        if inner.pending_removals.contains_key(&key) {
            debug!(key = %key, "Not caching disk read of key being removed");
            return None;
        }
        Some(inner.insert(key, value, cost, self.cost_limit))
    }

    // == Get ==
    /// Returns a clone of the image and marks it most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Contains ==
    /// Checks for an entry without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains(key)
    }

    // == Remove ==
    /// Drops the entry for `key`, returning whether one existed.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().remove(key)
    }

    // == Begin Removal ==
    /// Drops the entries for `keys` and blocks [`populate`](Self::populate)
    /// for them until the returned guard is dropped.
    ///
    /// The guard travels with the queued disk removal, so a disk read queued
    /// ahead of it cannot bring back the image being deleted.
    pub fn begin_removal(self: &Arc<Self>, keys: &[&str]) -> RemovalGuard<V> {
        let mut inner = self.inner.lock();
        for key in keys {
            inner.remove(key);
            *inner.pending_removals.entry(key.to_string()).or_insert(0) += 1;
        }
        RemovalGuard {
            store: Arc::clone(self),
            keys: keys.iter().map(|key| key.to_string()).collect(),
        }
    }

    // == Clear ==
    /// Drops every entry, returning how many were held.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.total_cost = 0;
        count
    }

    // == Memory Pressure ==
    /// Hook for host low-memory signals. Empties the store.
    pub fn on_memory_pressure(&self) -> usize {
        self.clear()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn total_cost(&self) -> usize {
        self.inner.lock().total_cost
    }

    pub fn cost_limit(&self) -> Option<usize> {
        self.cost_limit
    }
}

// == Removal Guard ==
/// Marks keys as being removed from disk; see [`MemoryStore::begin_removal`].
#[derive(Debug)]
pub struct RemovalGuard<V> {
    store: Arc<MemoryStore<V>>,
    keys: Vec<String>,
}

impl<V> Drop for RemovalGuard<V> {
    fn drop(&mut self) {
        let mut inner = self.store.inner.lock();
        for key in &self.keys {
            if let Some(count) = inner.pending_removals.get_mut(key) {
                *count -= 1;
                if *count == 0 {
                    inner.pending_removals.remove(key);
                }
            }
        }
    }
}
