//! # tier-limit
//!
//! `tier-limit` provides distributed, tier aware token bucket admission control.
//!
//! ## Core Philosophy
//!
//! Service instances are stateless. Every bucket lives in a shared store and is
//! refilled and consumed by a single atomic operation at that store, so the
//! rate a caller sees is global no matter how many instances serve it. No
//! client side locking is needed: the store's atomic execution is the only
//! mutual exclusion.
//!
//! ## Key Concepts
//!
//! * **Policy Catalog**: (tier, endpoint) to capacity and refill rate, with a
//!   fallback chain that never fails.
//! * **Identity Resolver**: credential to [`Tier`], swappable behind a trait.
//! * **Bucket Engine**: the atomic check-and-consume against a [`BucketStore`].
//!   It only exists once initialized, see [`BucketEngine::initialize`] and
//!   [`EngineSlot`].
//! * **Lazy Evaluation**: tokens are recalculated at the moment of the request;
//!   there are no background refill timers.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tier_limit::BucketEngine;
//! use tier_limit::BucketKey;
//! use tier_limit::IdentityResolver;
//! use tier_limit::MemoryStore;
//! use tier_limit::PolicyCatalog;
//! use tier_limit::PrefixResolver;
//!
//! # tokio_test();
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn tokio_test() {
//! let engine = BucketEngine::initialize(Arc::new(MemoryStore::new()))
//!     .await
//!     .unwrap();
//!
//! let credential = Some("premium_abc");
//! let tier = PrefixResolver::default().classify(credential);
//! let policy = PolicyCatalog::default().resolve(tier, "/api/data");
//! let key = BucketKey::new(credential, "/api/data");
//!
//! if engine.check_and_consume(&key, &policy, 1_700_000_000).await.unwrap() {
//!     // Request allowed
//! }
//! # }
//! ```

mod bucket;
mod clock;
mod config;
mod engine;
mod error;
mod identity;
mod policy;
mod store;
mod tier;

pub use bucket::BucketKey;
pub use bucket::BucketState;
pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use config::TierLimitConfig;
pub use engine::BucketEngine;
pub use engine::EngineSlot;
pub use error::ConfigError;
pub use error::EngineError;
pub use error::StoreError;
pub use identity::IdentityResolver;
pub use identity::PrefixResolver;
pub use policy::MAX_BUCKET_TTL;
pub use policy::Policy;
pub use policy::PolicyCatalog;
pub use policy::PolicyTable;
pub use policy::TierPolicies;
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::BucketRequest;
pub use store::BucketStore;
pub use store::MemoryStore;
pub use tier::Tier;
pub use tier::UnknownTier;
