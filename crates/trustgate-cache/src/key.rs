//! Deterministic cache key derivation.
//!
//! Every component that shares a cache (tiers, deduplicator, orchestrator)
//! must derive keys identically, otherwise cross-tier backfill and
//! single-flight matching silently stop working. [`NormalizedKey`] is that
//! single derivation: trim, truncate, SHA-256, hex.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::DEFAULT_MAX_INPUT_CHARS;

/// A normalized, hashed cache key for a piece of input text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    /// Derive a key from raw input text using the default length cap.
    pub fn derive(text: &str) -> Self {
        Self::derive_with_cap(text, DEFAULT_MAX_INPUT_CHARS)
    }

    /// Derive a key with an explicit length cap (in characters).
    ///
    /// Normalization: leading/trailing whitespace is trimmed, then the text
    /// is truncated to `max_chars` characters before hashing. Oversized
    /// input is never rejected; truncation keeps the guard itself from
    /// becoming a denial-of-service vector.
    pub fn derive_with_cap(text: &str, max_chars: usize) -> Self {
        let normalized = normalize(text, max_chars);
        let digest = Sha256::digest(normalized.as_bytes());
        let mut hex = String::with_capacity(64);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// The hex-encoded digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable shard index in `[0, shard_count)`.
    ///
    /// Lock-sharded structures (L1 cache, dedup pending map) select their
    /// shard with this so contention stays per-key, not global. The digest
    /// is uniform, so the first byte spreads keys evenly.
    pub fn shard(&self, shard_count: usize) -> usize {
        let byte = u8::from_str_radix(&self.0[..2], 16).unwrap_or(0);
        byte as usize % shard_count
    }
}

impl std::fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Apply the shared normalization without hashing.
pub(crate) fn normalize(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        trimmed.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_text_same_key() {
        let a = NormalizedKey::derive("hello world");
        let b = NormalizedKey::derive("hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn test_trim_is_part_of_identity() {
        let a = NormalizedKey::derive("  hello world  ");
        let b = NormalizedKey::derive("hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_text_different_key() {
        let a = NormalizedKey::derive("hello");
        let b = NormalizedKey::derive("goodbye");
        assert_ne!(a, b);
    }

    #[test]
    fn test_truncation_cap() {
        let long = "x".repeat(10_000);
        let capped = "x".repeat(DEFAULT_MAX_INPUT_CHARS);
        assert_eq!(NormalizedKey::derive(&long), NormalizedKey::derive(&capped));
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let key = NormalizedKey::derive("abc");
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_multibyte_truncation_does_not_panic() {
        let long = "é".repeat(DEFAULT_MAX_INPUT_CHARS + 100);
        let _ = NormalizedKey::derive(&long);
    }

    #[test]
    fn test_shard_stable_and_in_range() {
        let key = NormalizedKey::derive("some input");
        let shard = key.shard(16);
        assert!(shard < 16);
        assert_eq!(shard, NormalizedKey::derive("some input").shard(16));
    }

    #[test]
    fn test_shards_spread_across_keys() {
        let shards: std::collections::HashSet<usize> = (0..32)
            .map(|i| NormalizedKey::derive(&format!("input number {i}")).shard(16))
            .collect();
        assert!(shards.len() > 1, "keys must not pile onto one shard");
    }
}
