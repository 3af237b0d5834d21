//! Bounded LRU map used as the L1 exact-match tier.
//!
//! Capacity is fixed at construction; inserting into a full cache evicts
//! the least recently used entry. Both `get` and `insert` count as use.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// A bounded least-recently-used cache.
///
/// Recency is tracked with a deque of keys plus a per-key generation
/// counter; stale deque entries are skipped during eviction, which keeps
/// both operations O(1) amortized without an intrusive list.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    map: HashMap<K, Slot<V>>,
    order: VecDeque<(K, u64)>,
    clock: u64,
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    generation: u64,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// A zero capacity is bumped to one so the cache is always usable.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            order: VecDeque::new(),
            clock: 0,
        }
    }

    /// Look up a key, marking it most recently used on hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.clock += 1;
        let clock = self.clock;
        let slot = self.map.get_mut(key)?;
        slot.generation = clock;
        self.order.push_back((key.clone(), clock));
        self.compact();
        Some(&self.map[key].value)
    }

    /// Insert or replace a value, evicting the LRU entry when full.
    pub fn insert(&mut self, key: K, value: V) {
        self.clock += 1;
        let generation = self.clock;

        if self.map.insert(key.clone(), Slot { value, generation }).is_none()
            && self.map.len() > self.capacity
        {
            self.evict_one();
        }
        self.order.push_back((key, generation));
        self.compact();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when no entries are cached.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    fn evict_one(&mut self) {
        while let Some((key, generation)) = self.order.pop_front() {
            let live = self
                .map
                .get(&key)
                .is_some_and(|slot| slot.generation == generation);
            if live {
                self.map.remove(&key);
                return;
            }
            // Stale recency record for a key touched again later; skip.
        }
    }

    fn compact(&mut self) {
        // Keep the deque from growing without bound under heavy `get`
        // traffic: drop stale records once it is far larger than the map.
        while self.order.len() > self.capacity.saturating_mul(4).max(16) {
            if let Some((key, generation)) = self.order.pop_front() {
                let live = self
                    .map
                    .get(&key)
                    .is_some_and(|slot| slot.generation == generation);
                if live {
                    self.order.push_front((key, generation));
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut cache = LruCache::new(4);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn test_capacity_evicts_lru() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), None, "oldest entry should be evicted");
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[test]
    fn test_get_refreshes_recency() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(cache.get(&"a"), Some(&1));
        cache.insert("c", 3);

        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[test]
    fn test_replace_does_not_grow() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("a", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"a"), Some(&2));
    }

    #[test]
    fn test_clear() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn test_zero_capacity_bumped() {
        let mut cache = LruCache::new(0);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(&1));
    }

    #[test]
    fn test_heavy_get_traffic_bounded() {
        let mut cache = LruCache::new(4);
        for i in 0..4 {
            cache.insert(i, i);
        }
        for _ in 0..10_000 {
            let _ = cache.get(&1);
        }
        assert!(cache.order.len() <= 4 * 4 + 16);
    }
}
