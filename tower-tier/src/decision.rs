use std::fmt;
use std::time::Duration;

use http::HeaderMap;
use http::HeaderName;
use http::HeaderValue;
use http::header::RETRY_AFTER;
use tier_limit::Policy;
use tier_limit::Tier;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_TIER: HeaderName = HeaderName::from_static("x-ratelimit-tier");
pub const X_RATELIMIT_STATUS: HeaderName = HeaderName::from_static("x-ratelimit-status");

/// The terminal state a request reaches in the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// A token was available.
    Allow,
    /// The bucket is empty.
    Deny,
    /// The store could not be consulted; the tier is admitted anyway.
    DegradeOpen,
    /// The store could not be consulted; the tier is rejected.
    DegradeClosed,
}

impl Outcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Outcome::Allow => "allow",
            Outcome::Deny => "deny",
            Outcome::DegradeOpen => "degrade-open",
            Outcome::DegradeClosed => "degrade-closed",
        }
    }

    pub const fn allowed(&self) -> bool {
        matches!(self, Outcome::Allow | Outcome::DegradeOpen)
    }

    pub const fn status(&self) -> Status {
        match self {
            Outcome::Allow | Outcome::Deny => Status::Active,
            Outcome::DegradeOpen | Outcome::DegradeClosed => Status::ServiceDegraded,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether rate limiting is currently being enforced against the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Active,
    ServiceDegraded,
}

impl Status {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::ServiceDegraded => "service-degraded",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The gateway's verdict for one request.
///
/// Allowed requests carry this in their extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub tier: Tier,
    /// Capacity of the policy that applied.
    pub limit: u32,
    pub status: Status,
    pub outcome: Outcome,
    pub window_seconds: u64,
    /// Present on every rejection.
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    pub fn new(outcome: Outcome, tier: Tier, policy: &Policy, retry_after: Option<Duration>) -> Self {
        Self {
            allowed: outcome.allowed(),
            tier,
            limit: policy.capacity,
            status: outcome.status(),
            outcome,
            window_seconds: policy.window_seconds,
            retry_after,
        }
    }

    /// Write the rate limit headers.
    pub fn annotate(&self, headers: &mut HeaderMap) {
        annotate(headers, self.limit, self.tier, self.status, self.retry_after);
    }
}

pub(crate) fn annotate(
    headers: &mut HeaderMap,
    limit: u32,
    tier: Tier,
    status: Status,
    retry_after: Option<Duration>,
) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_TIER, HeaderValue::from_static(tier.as_str()));
    headers.insert(X_RATELIMIT_STATUS, HeaderValue::from_static(status.as_str()));
    if let Some(retry_after) = retry_after {
        let secs = retry_after.as_secs().max(1);
        headers.insert(RETRY_AFTER, HeaderValue::from(secs));
    }
}
