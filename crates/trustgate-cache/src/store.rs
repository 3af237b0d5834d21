//! Shared (L3) cache store contract.
//!
//! The L3 tier is an external distributed store (Valkey/Redis-class). The
//! core only needs get and TTL-bounded set; entries are shared across
//! processes and must be treated as possibly stale by every reader.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::StoreError;

/// Contract for the shared distributed cache backing L3.
#[async_trait]
pub trait SharedCacheStore: Send + Sync {
    /// Fetch raw bytes for a key, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store raw bytes under a key with a TTL in seconds.
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), StoreError>;
}

/// In-process [`SharedCacheStore`] with real TTL expiry.
///
/// Stands in for the distributed store in tests and single-node
/// deployments; not shared across processes.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .expect("store lock poisoned")
            .values()
            .filter(|(_, deadline)| *deadline > now)
            .count()
    }

    /// True when no unexpired entries exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SharedCacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        match entries.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), StoreError> {
        let deadline = Instant::now() + Duration::from_secs(ttl_secs);
        self.entries
            .lock()
            .expect("store lock poisoned")
            .insert(key.to_string(), (value, deadline));
        Ok(())
    }
}
