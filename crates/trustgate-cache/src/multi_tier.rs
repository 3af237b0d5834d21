//! Three-tier cache with fallback hierarchy and cross-tier backfill.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::key::{normalize, NormalizedKey};
use crate::lru::LruCache;
use crate::semantic::{SimilarityCache, TextEmbedder};
use crate::store::SharedCacheStore;
use crate::DEFAULT_MAX_INPUT_CHARS;

/// Key namespace in the shared store, so unrelated tenants of the same
/// store cannot collide with classification results.
const L3_KEY_PREFIX: &str = "threat_cache:";

/// Number of lock shards for the L1 tier. Lookups for different keys
/// contend only within their shard, never on one global lock.
const L1_SHARDS: usize = 16;

/// Which tier satisfied a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheTier {
    /// Process-local exact match.
    L1,
    /// Process-local similarity match.
    L2,
    /// Shared distributed store, exact match, TTL-bounded.
    L3,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub total_lookups: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
    pub misses: u64,
    pub l1_sets: u64,
    pub l2_sets: u64,
    pub l3_sets: u64,
    /// Combined hit rate across tiers, 0.0 when nothing was looked up.
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    total_lookups: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    l3_hits: AtomicU64,
    misses: AtomicU64,
    l1_sets: AtomicU64,
    l2_sets: AtomicU64,
    l3_sets: AtomicU64,
}

/// Multi-tier cache: L1 exact LRU, L2 similarity, L3 shared store.
///
/// Lookup order is L1 → L2 → L3. An L2 hit backfills L3 (and L1); an L3
/// hit backfills L2 under the exact text (and L1). `set` writes through
/// every enabled tier. A failing tier degrades silently: an unreachable
/// shared store or embedder must never fail a classification request.
///
/// L1 is lock-sharded by key; capacity is split evenly across the shards.
pub struct MultiTierCache<V> {
    l1: Vec<Mutex<LruCache<NormalizedKey, V>>>,
    l2: Option<Mutex<SimilarityCache<V>>>,
    embedder: Option<Arc<dyn TextEmbedder>>,
    store: Option<Arc<dyn SharedCacheStore>>,
    l3_ttl_secs: u64,
    max_input_chars: usize,
    counters: Counters,
}

/// Builder for [`MultiTierCache`]; tiers beyond L1 are opt-in.
pub struct MultiTierCacheBuilder {
    l1_capacity: usize,
    l2_capacity: usize,
    l2_threshold: f32,
    l3_ttl_secs: u64,
    max_input_chars: usize,
    embedder: Option<Arc<dyn TextEmbedder>>,
    store: Option<Arc<dyn SharedCacheStore>>,
}

impl Default for MultiTierCacheBuilder {
    fn default() -> Self {
        Self {
            l1_capacity: 1024,
            l2_capacity: 1000,
            l2_threshold: 0.95,
            l3_ttl_secs: 3600,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            embedder: None,
            store: None,
        }
    }
}

impl MultiTierCacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn l1_capacity(mut self, capacity: usize) -> Self {
        self.l1_capacity = capacity;
        self
    }

    pub fn l2_capacity(mut self, capacity: usize) -> Self {
        self.l2_capacity = capacity;
        self
    }

    pub fn l2_threshold(mut self, threshold: f32) -> Self {
        self.l2_threshold = threshold;
        self
    }

    pub fn l3_ttl_secs(mut self, ttl: u64) -> Self {
        self.l3_ttl_secs = ttl;
        self
    }

    pub fn max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max;
        self
    }

    /// Enable the L2 similarity tier with this embedder.
    pub fn embedder(mut self, embedder: Arc<dyn TextEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Enable the L3 shared tier with this store.
    pub fn store(mut self, store: Arc<dyn SharedCacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build<V: Clone>(self) -> MultiTierCache<V> {
        let l2 = self
            .embedder
            .is_some()
            .then(|| Mutex::new(SimilarityCache::new(self.l2_threshold, self.l2_capacity)));
        info!(
            l1_capacity = self.l1_capacity,
            l2_enabled = l2.is_some(),
            l3_enabled = self.store.is_some(),
            "multi-tier cache initialized"
        );
        let shard_capacity = (self.l1_capacity / L1_SHARDS).max(1);
        MultiTierCache {
            l1: (0..L1_SHARDS)
                .map(|_| Mutex::new(LruCache::new(shard_capacity)))
                .collect(),
            l2,
            embedder: self.embedder,
            store: self.store,
            l3_ttl_secs: self.l3_ttl_secs,
            max_input_chars: self.max_input_chars,
            counters: Counters::default(),
        }
    }
}

impl<V> MultiTierCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Cache with default sizing and only the L1 tier enabled.
    pub fn local_only() -> Self {
        MultiTierCacheBuilder::new().build()
    }

    /// Look up a cached value, reporting which tier satisfied it.
    pub async fn get(&self, text: &str) -> Option<(V, CacheTier)> {
        self.counters.total_lookups.fetch_add(1, Ordering::Relaxed);
        let normalized = normalize(text, self.max_input_chars);
        let key = NormalizedKey::derive_with_cap(text, self.max_input_chars);

        // L1: exact match.
        if let Some(value) = self.l1_shard(&key).lock().expect("l1 lock poisoned").get(&key) {
            self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "L1 cache hit");
            return Some((value.clone(), CacheTier::L1));
        }

        // L2: similarity match against previously seen inputs.
        let embedding = self.embed(&normalized).await;
        if let (Some(l2), Some(embedding)) = (&self.l2, &embedding) {
            let hit = l2.lock().expect("l2 lock poisoned").get(embedding);
            if let Some((value, hit_key)) = hit {
                self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "L2 cache hit (similarity)");
                self.l3_set(&hit_key, &value).await;
                self.l1_shard(&key)
                    .lock()
                    .expect("l1 lock poisoned")
                    .insert(key, value.clone());
                return Some((value, CacheTier::L2));
            }
        }

        // L3: shared store, exact match.
        if let Some(value) = self.l3_get(&key).await {
            self.counters.l3_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "L3 cache hit (shared)");
            if let (Some(l2), Some(embedding)) = (&self.l2, embedding) {
                l2.lock()
                    .expect("l2 lock poisoned")
                    .set(embedding, key.clone(), value.clone());
            }
            self.l1_shard(&key)
                .lock()
                .expect("l1 lock poisoned")
                .insert(key, value.clone());
            return Some((value, CacheTier::L3));
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Write a value through every enabled tier.
    pub async fn set(&self, text: &str, value: V) {
        let normalized = normalize(text, self.max_input_chars);
        let key = NormalizedKey::derive_with_cap(text, self.max_input_chars);

        self.l1_shard(&key)
            .lock()
            .expect("l1 lock poisoned")
            .insert(key.clone(), value.clone());
        self.counters.l1_sets.fetch_add(1, Ordering::Relaxed);

        if let Some(l2) = &self.l2 {
            if let Some(embedding) = self.embed(&normalized).await {
                l2.lock()
                    .expect("l2 lock poisoned")
                    .set(embedding, key.clone(), value.clone());
                self.counters.l2_sets.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.l3_set(&key, &value).await;
    }

    /// Clear the process-local tiers.
    ///
    /// L3 is shared across instances and is never cleared from here; its
    /// entries age out by TTL.
    pub fn clear(&self) {
        for shard in &self.l1 {
            shard.lock().expect("l1 lock poisoned").clear();
        }
        if let Some(l2) = &self.l2 {
            l2.lock().expect("l2 lock poisoned").clear();
        }
        info!("L1 and L2 caches cleared");
    }

    /// Snapshot of the cache counters.
    pub fn metrics(&self) -> CacheMetrics {
        let total = self.counters.total_lookups.load(Ordering::Relaxed);
        let l1_hits = self.counters.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.counters.l2_hits.load(Ordering::Relaxed);
        let l3_hits = self.counters.l3_hits.load(Ordering::Relaxed);
        let hits = l1_hits + l2_hits + l3_hits;
        CacheMetrics {
            total_lookups: total,
            l1_hits,
            l2_hits,
            l3_hits,
            misses: self.counters.misses.load(Ordering::Relaxed),
            l1_sets: self.counters.l1_sets.load(Ordering::Relaxed),
            l2_sets: self.counters.l2_sets.load(Ordering::Relaxed),
            l3_sets: self.counters.l3_sets.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    fn l1_shard(&self, key: &NormalizedKey) -> &Mutex<LruCache<NormalizedKey, V>> {
        &self.l1[key.shard(L1_SHARDS)]
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text).await {
            Ok(embedding) => Some(embedding),
            Err(err) => {
                warn!(error = %err, "embedder unavailable, degrading to exact-match tiers");
                None
            }
        }
    }

    async fn l3_get(&self, key: &NormalizedKey) -> Option<V> {
        let store = self.store.as_ref()?;
        match store.get(&format!("{L3_KEY_PREFIX}{key}")).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(error = %err, "corrupt L3 cache value, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "L3 cache get failed, degrading to local tiers");
                None
            }
        }
    }

    async fn l3_set(&self, key: &NormalizedKey, value: &V) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to encode L3 cache value");
                return;
            }
        };
        match store
            .set_with_ttl(&format!("{L3_KEY_PREFIX}{key}"), bytes, self.l3_ttl_secs)
            .await
        {
            Ok(()) => {
                self.counters.l3_sets.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!(error = %err, "L3 cache set failed, continuing without shared tier");
            }
        }
    }
}
