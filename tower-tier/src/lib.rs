//! # Tower Tier
//!
//! `tower-tier` is the admission gateway of [`tier_limit`], packaged as a
//! [Tower](https://github.com/tower-rs/tower) layer for HTTP services.
//!
//! ## The Admission Stack
//! For every request the [`AdmissionLayer`]:
//!
//! 1. **Identifies** the caller from a credential header (`x-api-key` by default)
//!    and classifies it into a tier.
//! 2. **Resolves** the policy for (tier, request path).
//! 3. **Consults** the shared bucket engine, bounded by a timeout.
//! 4. **Decides**: allow, deny (`429`), or, when the engine cannot answer,
//!    degrade. Paid tiers are admitted with status `service-degraded`; the free
//!    tier is rejected with `503`.
//!
//! Every response carries `X-RateLimit-Limit`, `X-RateLimit-Tier` and
//! `X-RateLimit-Status`; rejections add `Retry-After`. Admitted requests carry
//! their [`RateLimitDecision`] as a request extension.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`Rejection`].
//! - `redis`: Enables the Redis bucket store in `tier-limit` (default).

mod decision;
mod error;
mod gateway;
mod layer;
mod metrics;
mod service;


pub use decision::Outcome;
pub use decision::RateLimitDecision;
pub use decision::Status;
pub use decision::X_RATELIMIT_LIMIT;
pub use decision::X_RATELIMIT_STATUS;
pub use decision::X_RATELIMIT_TIER;
pub use error::Rejection;
pub use gateway::AdmissionGateway;
pub use layer::AdmissionLayer;
pub use layer::DEFAULT_CREDENTIAL_HEADER;
pub use service::AdmissionService;
