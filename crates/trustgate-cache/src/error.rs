//! Error types for cache tiers and deduplication.

use thiserror::Error;

/// Error from the shared (L3) cache store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached (network partition, connection refused).
    #[error("shared store unavailable: {0}")]
    Unavailable(String),

    /// The stored bytes could not be decoded.
    #[error("corrupt cache value: {0}")]
    Corrupt(String),
}

/// Error from a multi-tier cache operation.
///
/// Tier faults are handled internally by degrading to the remaining tiers;
/// this type surfaces only for operations with no fallback (currently none
/// in the lookup path).
#[derive(Debug, Error)]
pub enum CacheError {
    /// Value serialization for the shared tier failed.
    #[error("cache value codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Shared store error passthrough.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Error observed by deduplicator callers.
///
/// Cloneable so a single outcome can be shared with every waiter attached
/// to the same in-flight request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DedupError {
    /// The shared work function returned an error.
    #[error("deduplicated work failed: {0}")]
    Failed(String),

    /// The shared work function panicked.
    #[error("deduplicated work panicked: {0}")]
    Panicked(String),

    /// The in-flight entry vanished before delivering a result.
    #[error("in-flight request was lost")]
    Lost,
}
