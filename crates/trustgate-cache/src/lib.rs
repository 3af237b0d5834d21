//! # Trustgate Cache
//!
//! Multi-tier caching and request deduplication for the trustgate
//! threat-classification pipeline.
//!
//! ## Cache hierarchy
//!
//! | Tier | Match     | Scope         | Typical latency |
//! |------|-----------|---------------|-----------------|
//! | L1   | exact     | process-local | ~1us            |
//! | L2   | similarity| process-local | ~10ms (embed)   |
//! | L3   | exact     | shared store  | ~20-50ms        |
//!
//! Lookups fall through L1 → L2 → L3; hits backfill the neighbouring tier
//! (L2 hit → L3, L3 hit → L2). Writes go through every enabled tier. An
//! unavailable tier degrades silently and the caller never sees a tier fault.
//!
//! [`RequestDeduplicator`] provides single-flight execution: concurrent
//! identical requests share one in-flight computation and observe the same
//! outcome, including errors and panics.
//!
//! All components derive keys through [`NormalizedKey`] so that cross-tier
//! backfill and deduplication agree on request identity.

mod dedup;
mod error;
mod key;
mod lru;
mod multi_tier;
mod semantic;
mod store;

pub use dedup::{DedupMetrics, RequestDeduplicator};
pub use error::{CacheError, DedupError, StoreError};
pub use key::NormalizedKey;
pub use lru::LruCache;
pub use multi_tier::{CacheMetrics, CacheTier, MultiTierCache, MultiTierCacheBuilder};
pub use semantic::{cosine_similarity, SimilarityCache, TextEmbedder};
pub use store::{InMemoryStore, SharedCacheStore};

/// Default cap applied to input text before hashing, matching the
/// normalization every component sharing a cache must use.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 5000;
