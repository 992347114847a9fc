use std::time::Duration;

use http::HeaderValue;
use http::Response;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use tier_limit::Tier;

use crate::decision::Outcome;
use crate::decision::RateLimitDecision;
use crate::decision::Status;
use crate::decision::annotate;

/// Why the gateway refused a request.
///
/// These are the only two failures a caller ever sees; every other fault is
/// resolved by the degradation rules.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    /// The caller's bucket is empty.
    ///
    /// Converts to `429 Too Many Requests` with a `Retry-After` header.
    #[error(
        "You have exceeded the rate limit of {limit} requests per {window_seconds} seconds for tier: {tier}"
    )]
    RateLimited {
        tier: Tier,
        limit: u32,
        window_seconds: u64,
        retry_after: Duration,
    },

    /// The shared store is unavailable and the caller's tier fails closed.
    ///
    /// Converts to `503 Service Unavailable` with a `Retry-After` header.
    #[error("Rate limiting is unavailable and requests for tier {tier} are rejected until it recovers")]
    Degraded {
        tier: Tier,
        limit: u32,
        retry_after: Duration,
    },
}

impl Rejection {
    /// The rejection for a decision, or `None` if the request may proceed.
    pub fn from_decision(decision: &RateLimitDecision) -> Option<Self> {
        let retry_after = decision.retry_after.unwrap_or(Duration::from_secs(1));
        match decision.outcome {
            Outcome::Allow | Outcome::DegradeOpen => None,
            Outcome::Deny => Some(Self::RateLimited {
                tier: decision.tier,
                limit: decision.limit,
                window_seconds: decision.window_seconds,
                retry_after,
            }),
            Outcome::DegradeClosed => Some(Self::Degraded {
                tier: decision.tier,
                limit: decision.limit,
                retry_after,
            }),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Degraded { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn retry_after(&self) -> Duration {
        match self {
            Self::RateLimited { retry_after, .. } | Self::Degraded { retry_after, .. } => {
                *retry_after
            }
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            Self::RateLimited { tier, limit, .. } => serde_json::json!({
                "error": "Rate limit exceeded",
                "tier": tier,
                "limit": limit,
                "message": self.to_string(),
            }),
            Self::Degraded { tier, limit, .. } => serde_json::json!({
                "error": "Service degraded",
                "tier": tier,
                "limit": limit,
                "message": self.to_string(),
            }),
        }
    }

    /// Build the HTTP response for this rejection, with the rate limit headers set.
    pub fn to_response<B>(&self) -> Response<B>
    where
        B: From<String>,
    {
        let (tier, limit, status) = match self {
            Self::RateLimited { tier, limit, .. } => (*tier, *limit, Status::Active),
            Self::Degraded { tier, limit, .. } => (*tier, *limit, Status::ServiceDegraded),
        };

        let mut response = Response::new(B::from(self.body().to_string()));
        *response.status_mut() = self.status_code();
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        annotate(headers, limit, tier, status, Some(self.retry_after()));
        response
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Rejection {
    fn into_response(self) -> axum::response::Response {
        self.to_response::<axum::body::Body>()
    }
}

#[cfg(test)]
mod tests {
    use http::header::RETRY_AFTER;
    use tier_limit::Policy;

    use super::*;
    use crate::decision::X_RATELIMIT_STATUS;

    #[test]
    fn allowed_decisions_are_not_rejections() {
        let policy = Policy::new(10, 1.0, 60);
        for outcome in [Outcome::Allow, Outcome::DegradeOpen] {
            let decision = RateLimitDecision::new(outcome, Tier::Premium, &policy, None);
            assert!(Rejection::from_decision(&decision).is_none());
        }
    }

    #[test]
    fn denial_is_a_429() {
        let decision = RateLimitDecision::new(
            Outcome::Deny,
            Tier::Free,
            &Policy::new(10, 1.0, 60),
            Some(Duration::from_secs(1)),
        );
        let rejection = Rejection::from_decision(&decision).unwrap();
        let response = rejection.to_response::<String>();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "1");
        assert_eq!(response.headers()[X_RATELIMIT_STATUS], "active");

        let body: serde_json::Value = serde_json::from_str(response.body()).unwrap();
        assert_eq!(body["error"], "Rate limit exceeded");
        assert_eq!(body["tier"], "free");
        assert_eq!(body["limit"], 10);
        assert_eq!(
            body["message"],
            "You have exceeded the rate limit of 10 requests per 60 seconds for tier: free"
        );
    }

    #[test]
    fn degraded_closed_is_a_503() {
        let decision = RateLimitDecision::new(
            Outcome::DegradeClosed,
            Tier::Free,
            &Policy::new(10, 1.0, 60),
            Some(Duration::from_secs(5)),
        );
        let response = Rejection::from_decision(&decision)
            .unwrap()
            .to_response::<String>();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[RETRY_AFTER], "5");
        assert_eq!(response.headers()[X_RATELIMIT_STATUS], "service-degraded");
    }
}
