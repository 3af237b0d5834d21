//! Similarity-match (L2) cache tier.
//!
//! Stores `(embedding, key, value)` triples and answers a lookup with the
//! value of the *most similar* previously seen input, provided its cosine
//! similarity clears the configured threshold. Embeddings come from an
//! external [`TextEmbedder`] collaborator; when that collaborator is absent
//! or failing, the tier degrades to a guaranteed miss instead of erroring.

use async_trait::async_trait;
use tracing::debug;

use crate::error::StoreError;
use crate::key::NormalizedKey;

/// External embedding collaborator.
///
/// May be backed by a local model or a network service; either way it is a
/// suspension point and may be unavailable.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed `text` into a dense vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;
}

/// Cosine similarity of two vectors; 0.0 for mismatched or zero-norm input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[derive(Debug, Clone)]
struct Entry<V> {
    embedding: Vec<f32>,
    key: NormalizedKey,
    value: V,
}

/// Bounded similarity cache over embedded inputs.
///
/// Linear scan; capacity is bounded (default 1000) so scan cost stays flat.
/// Eviction is FIFO; recency tracking buys little here because hits are
/// approximate matches, not repeats of one hot key.
pub struct SimilarityCache<V> {
    threshold: f32,
    max_size: usize,
    entries: Vec<Entry<V>>,
}

impl<V: Clone> SimilarityCache<V> {
    /// Create a cache with the given similarity threshold and capacity.
    pub fn new(threshold: f32, max_size: usize) -> Self {
        Self {
            threshold,
            max_size: max_size.max(1),
            entries: Vec::new(),
        }
    }

    /// Find the most similar cached entry at or above the threshold.
    ///
    /// Returns the value and the exact key it was stored under (used by the
    /// multi-tier cache to backfill L3 under the original identity).
    pub fn get(&self, embedding: &[f32]) -> Option<(V, NormalizedKey)> {
        let mut best_sim = -1.0f32;
        let mut best: Option<&Entry<V>> = None;

        for entry in &self.entries {
            let sim = cosine_similarity(embedding, &entry.embedding);
            if sim > best_sim {
                best_sim = sim;
                best = Some(entry);
            }
        }

        if best_sim >= self.threshold {
            debug!(similarity = best_sim, "similarity cache hit");
            best.map(|e| (e.value.clone(), e.key.clone()))
        } else {
            None
        }
    }

    /// Store a value under its embedding and exact key.
    pub fn set(&mut self, embedding: Vec<f32>, key: NormalizedKey, value: V) {
        if self.entries.len() >= self.max_size {
            self.entries.remove(0);
        }
        self.entries.push(Entry {
            embedding,
            key,
            value,
        });
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
