use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use super::BucketRequest;
use super::BucketStore;
use crate::BucketState;
use crate::StoreError;

/// Seconds between sweeps of expired buckets.
const SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: BucketState,
    expires_at: u64,
}

#[derive(Debug, Default)]
struct Buckets {
    entries: HashMap<String, Entry>,
    next_sweep: u64,
}

impl Buckets {
    fn purge(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }
}

/// Process-local bucket store.
///
/// Each operation runs under one lock, which gives the same atomicity a
/// scripting store provides. Only correct for a single instance; use it for
/// tests, demos and single-node deployments.
///
/// Expired buckets are swept at most once a minute of request time, from
/// inside [`BucketStore::check_and_consume`], so idle callers do not
/// accumulate.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: Mutex<Buckets>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a bucket, ignoring expiry.
    pub fn state(&self, key: &str) -> Option<BucketState> {
        self.buckets.lock().entries.get(key).map(|entry| entry.state)
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.lock().entries.is_empty()
    }

    /// Drop buckets whose TTL elapsed at `now`. Returns how many were dropped.
    pub fn purge_expired(&self, now: u64) -> usize {
        self.buckets.lock().purge(now)
    }
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn check_and_consume(&self, request: BucketRequest<'_>) -> Result<bool, StoreError> {
        let mut buckets = self.buckets.lock();

        if request.now >= buckets.next_sweep {
            let purged = buckets.purge(request.now);
            if purged > 0 {
                trace!(purged, "swept expired buckets");
            }
            buckets.next_sweep = request.now.saturating_add(SWEEP_INTERVAL_SECS);
        }

        let mut state = match buckets.entries.get(request.key) {
            Some(entry) if entry.expires_at > request.now => entry.state,
            _ => BucketState::full(request.capacity, request.now),
        };
        let allowed = state.refill_and_consume(request.capacity, request.refill_rate, request.now);

        buckets.entries.insert(
            request.key.to_string(),
            Entry {
                state,
                expires_at: state.last_refill.saturating_add(request.ttl.as_secs()),
            },
        );

        Ok(allowed)
    }
}
