//! A thread-safe, bounded, TTL + FIFO-eviction cache.
//!
//! One mutex guards the whole map; the critical section covers the size
//! check, eviction, and insertion as a single unit, so no reader ever
//! observes a size above capacity. This is the lock-as-handle shape used
//! throughout the stack: callers never see the inner map, only `get`/`put`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    payload: V,
    inserted_at: Instant,
}

struct Inner<V> {
    map: HashMap<String, Entry<V>>,
    /// Insertion order, oldest at the front. Used for FIFO eviction; never
    /// reordered on access (this is not an LRU).
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

pub struct BoundedCache<V: Clone> {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> BoundedCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            inner: Mutex::new(Inner { map: HashMap::new(), order: VecDeque::new(), hits: 0, misses: 0 }),
        }
    }

    /// Returns `None` when the key is absent or its entry has expired.
    /// An expired entry found during lookup is evicted immediately.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let expired = match inner.map.get(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => {
                inner.misses += 1;
                return None;
            }
        };
        if expired {
            inner.map.remove(key);
            inner.order.retain(|k| k != key);
            inner.misses += 1;
            return None;
        }
        inner.hits += 1;
        inner.map.get(key).map(|e| e.payload.clone())
    }

    /// Atomically evicts-then-inserts. If `key` already exists its entry is
    /// replaced in place and no eviction happens (the replaced entry doesn't
    /// count as a new arrival in FIFO order).
    pub fn put(&self, key: String, payload: V) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        if inner.map.contains_key(&key) {
            inner.map.insert(key, Entry { payload, inserted_at: Instant::now() });
            return;
        }
        if inner.map.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            }
        }
        inner.order.push_back(key.clone());
        inner.map.insert(key, Entry { payload, inserted_at: Instant::now() });
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        CacheStats { size: inner.map.len(), hits: inner.hits, misses: inner.misses }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let cache: BoundedCache<String> = BoundedCache::new(10, Duration::from_secs(60));
        cache.put("k".to_string(), "v".to_string());
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn get_on_absent_key_is_none() {
        let cache: BoundedCache<String> = BoundedCache::new(10, Duration::from_secs(60));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn capacity_zero_never_caches() {
        let cache: BoundedCache<String> = BoundedCache::new(0, Duration::from_secs(60));
        cache.put("k".to_string(), "v".to_string());
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn over_capacity_evicts_oldest_inserted() {
        let cache: BoundedCache<i32> = BoundedCache::new(2, Duration::from_secs(60));
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.put("c".to_string(), 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn overwriting_existing_key_skips_eviction() {
        let cache: BoundedCache<i32> = BoundedCache::new(2, Duration::from_secs(60));
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.put("a".to_string(), 100);
        assert_eq!(cache.get("a"), Some(100));
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn expired_entry_is_absent() {
        let cache: BoundedCache<i32> = BoundedCache::new(10, Duration::from_millis(5));
        cache.put("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache: BoundedCache<i32> = BoundedCache::new(10, Duration::from_secs(60));
        cache.put("a".to_string(), 1);
        cache.get("a");
        cache.get("missing");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn size_never_exceeds_capacity_under_many_inserts() {
        let cache: BoundedCache<i32> = BoundedCache::new(4, Duration::from_secs(60));
        for i in 0..100 {
            cache.put(format!("k{i}"), i);
            assert!(cache.len() <= 4);
        }
    }
}
