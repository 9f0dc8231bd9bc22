//! A small capacity-bounded LRU cache with optional per-entry TTL.
//!
//! Used by the embedding client (repeated-query caching) and, via
//! `sme-rag-router`, by the response cache (§4.11). Single `parking_lot`
//! mutex; callers never hold it across an `await`.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// FIFO-ordered LRU: `touch` moves a key to the back of `order` on read.
pub struct LruCache<K, V> {
    capacity: usize,
    ttl: Option<Duration>,
    entries: Mutex<(HashMap<K, Entry<V>>, Vec<K>)>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, ttl: None, entries: Mutex::new((HashMap::new(), Vec::new())) }
    }

    pub fn with_ttl(capacity: usize, ttl: Duration) -> Self {
        Self { capacity, ttl: Some(ttl), entries: Mutex::new((HashMap::new(), Vec::new())) }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.entries.lock();
        let expired = match self.ttl {
            Some(ttl) => guard.0.get(key).map(|e| e.inserted_at.elapsed() > ttl).unwrap_or(false),
            None => false,
        };
        if expired {
            guard.0.remove(key);
            guard.1.retain(|k| k != key);
            return None;
        }
        let value = guard.0.get(key).map(|e| e.value.clone());
        if value.is_some() {
            guard.1.retain(|k| k != key);
            guard.1.push(key.clone());
        }
        value
    }

    pub fn put(&self, key: K, value: V) {
        let mut guard = self.entries.lock();
        if guard.0.contains_key(&key) {
            guard.1.retain(|k| k != &key);
        } else if guard.0.len() >= self.capacity {
            // Evict the least-recently-used entry (front of `order`).
            if !guard.1.is_empty() {
                let evicted = guard.1.remove(0);
                guard.0.remove(&evicted);
            }
        }
        guard.1.push(key.clone());
        guard.0.insert(key, Entry { value, inserted_at: Instant::now() });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut guard = self.entries.lock();
        guard.0.clear();
        guard.1.clear();
    }
}
