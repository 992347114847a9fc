use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::BucketKey;
use crate::BucketRequest;
use crate::BucketStore;
use crate::EngineError;
use crate::Policy;

/// A ready-to-use handle on the atomic bucket operation.
///
/// The only way to obtain one is [`BucketEngine::initialize`], so holding an
/// engine means the store has been prepared.
#[derive(Debug, Clone)]
pub struct BucketEngine {
    store: Arc<dyn BucketStore>,
}

impl BucketEngine {
    /// Prepare the store (e.g. register the script) and return a ready engine.
    pub async fn initialize(store: Arc<dyn BucketStore>) -> Result<Self, EngineError> {
        store.prepare().await?;
        info!(?store, "bucket engine ready");
        Ok(Self { store })
    }

    /// Refill the bucket for `key` up to `now` and try to take one token.
    pub async fn check_and_consume(
        &self,
        key: &BucketKey,
        policy: &Policy,
        now: u64,
    ) -> Result<bool, EngineError> {
        let store_key = key.to_string();
        let allowed = self
            .store
            .check_and_consume(BucketRequest {
                key: &store_key,
                capacity: policy.capacity,
                refill_rate: policy.refill_rate,
                now,
                ttl: policy.ttl(),
            })
            .await?;
        debug!(key = %store_key, allowed, "bucket consulted");
        Ok(allowed)
    }
}

/// Holds an engine which may still be initializing.
///
/// Until initialization succeeds every lookup reports
/// [`EngineError::NotReady`]. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct EngineSlot {
    engine: Arc<OnceLock<BucketEngine>>,
}

impl EngineSlot {
    /// An empty slot. Requests are unavailable until [`EngineSlot::fill`] is called.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A slot holding an already initialized engine.
    pub fn ready(engine: BucketEngine) -> Self {
        let slot = Self::empty();
        slot.fill(engine);
        slot
    }

    /// Install an engine. Only the first engine installed is kept.
    pub fn fill(&self, engine: BucketEngine) -> bool {
        self.engine.set(engine).is_ok()
    }

    /// Initialize `store` in a background task, retrying every `retry` until
    /// it succeeds.
    pub fn initialize_in_background(
        store: Arc<dyn BucketStore>,
        retry: Duration,
    ) -> (Self, JoinHandle<()>) {
        let slot = Self::empty();
        let target = slot.clone();
        let handle = tokio::spawn(async move {
            loop {
                match BucketEngine::initialize(store.clone()).await {
                    Ok(engine) => {
                        target.fill(engine);
                        return;
                    }
                    Err(err) => {
                        warn!(%err, ?retry, "bucket engine initialization failed, retrying");
                        tokio::time::sleep(retry).await;
                    }
                }
            }
        });
        (slot, handle)
    }

    pub fn is_ready(&self) -> bool {
        self.engine.get().is_some()
    }

    pub fn get(&self) -> Result<&BucketEngine, EngineError> {
        self.engine.get().ok_or(EngineError::NotReady)
    }
}
