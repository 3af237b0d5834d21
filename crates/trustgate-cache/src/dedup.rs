//! Single-flight request deduplication.
//!
//! When several callers submit the same input concurrently, only one
//! classification runs; the rest subscribe to its outcome. Keys are the
//! same [`NormalizedKey`] derivation the cache uses, so "the same input"
//! means the same thing in both places.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::DedupError;
use crate::key::NormalizedKey;
use crate::DEFAULT_MAX_INPUT_CHARS;

type Outcome<T> = Result<Arc<T>, DedupError>;

/// Number of lock shards for the pending map. Requests for different keys
/// contend only within their shard, never on one global lock.
const PENDING_SHARDS: usize = 16;

type PendingShard<T> = Mutex<HashMap<NormalizedKey, broadcast::Sender<Outcome<T>>>>;

/// Snapshot of deduplicator counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupMetrics {
    pub total_requests: u64,
    pub deduplicated_requests: u64,
    pub in_flight: usize,
}

/// Collapses concurrent identical requests into one execution.
///
/// The first caller for a key becomes the leader; its work runs on a
/// detached task so that cancelling any individual caller, the leader
/// included, cannot strand the others. Every caller, leader and follower
/// alike, receives the same shared outcome: success as `Arc<T>`, failure
/// as a [`DedupError`] carrying the rendered error or panic message.
///
/// The pending map is lock-sharded by key so unrelated requests never
/// contend on a single global lock.
pub struct RequestDeduplicator<T> {
    pending: Arc<Vec<PendingShard<T>>>,
    max_input_chars: usize,
    total: AtomicU64,
    deduplicated: AtomicU64,
}

impl<T> Default for RequestDeduplicator<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INPUT_CHARS)
    }
}

impl<T> RequestDeduplicator<T>
where
    T: Send + Sync + 'static,
{
    /// Create a deduplicator using `max_input_chars` for key derivation.
    pub fn new(max_input_chars: usize) -> Self {
        Self {
            pending: Arc::new((0..PENDING_SHARDS).map(|_| Mutex::new(HashMap::new())).collect()),
            max_input_chars,
            total: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
        }
    }

    /// Run `work` for this input, or join an identical in-flight request.
    pub async fn execute<F, Fut, E>(&self, text: &str, work: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.total.fetch_add(1, Ordering::Relaxed);
        let key = NormalizedKey::derive_with_cap(text, self.max_input_chars);

        let mut rx = {
            let mut pending = self.pending[key.shard(PENDING_SHARDS)]
                .lock()
                .expect("pending lock poisoned");
            if let Some(tx) = pending.get(&key) {
                // Follower: an identical request is already running.
                self.deduplicated.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "joined in-flight request");
                tx.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                pending.insert(key.clone(), tx);
                self.spawn_leader(key, work());
                rx
            }
        };

        match rx.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(DedupError::Lost),
        }
    }

    /// Number of distinct requests currently in flight, across all shards.
    pub fn pending_len(&self) -> usize {
        self.pending
            .iter()
            .map(|shard| shard.lock().expect("pending lock poisoned").len())
            .sum()
    }

    /// Snapshot of the deduplicator counters.
    pub fn metrics(&self) -> DedupMetrics {
        DedupMetrics {
            total_requests: self.total.load(Ordering::Relaxed),
            deduplicated_requests: self.deduplicated.load(Ordering::Relaxed),
            in_flight: self.pending_len(),
        }
    }

    fn spawn_leader<Fut, E>(&self, key: NormalizedKey, work: Fut)
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        // The work itself runs on its own task so a panic surfaces as a
        // JoinError instead of taking the finisher down with it.
        let work_handle = tokio::spawn(work);
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let outcome = match work_handle.await {
                Ok(Ok(value)) => Ok(Arc::new(value)),
                Ok(Err(err)) => Err(DedupError::Failed(err.to_string())),
                Err(join_err) => Err(DedupError::Panicked(join_err.to_string())),
            };
            // Remove before broadcasting: a caller arriving after the send
            // must start a fresh request, not subscribe to a dead channel.
            let tx = pending[key.shard(PENDING_SHARDS)]
                .lock()
                .expect("pending lock poisoned")
                .remove(&key);
            if let Some(tx) = tx {
                let _ = tx.send(outcome);
            }
        });
    }
}
