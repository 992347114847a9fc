//! Shared bucket storage.
//!
//! A [`BucketStore`] owns bucket state and runs the whole refill-and-consume
//! step as one indivisible operation, so concurrent callers on any instance
//! observe a single sequence of consumptions per key.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::StoreError;

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// Arguments of one check-and-consume operation.
#[derive(Debug, Clone, Copy)]
pub struct BucketRequest<'a> {
    pub key: &'a str,
    pub capacity: u32,
    pub refill_rate: f64,
    /// Epoch seconds.
    pub now: u64,
    /// Inactivity after which the bucket may be dropped.
    pub ttl: Duration,
}

#[async_trait]
pub trait BucketStore: Debug + Send + Sync {
    /// One-time preparation before the first request, e.g. registering a script.
    async fn prepare(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Atomically refill the bucket, take a token if one is available, and
    /// persist the result. Returns whether a token was taken.
    async fn check_and_consume(&self, request: BucketRequest<'_>) -> Result<bool, StoreError>;
}
