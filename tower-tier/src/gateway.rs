use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tier_limit::BucketKey;
use tier_limit::Clock;
use tier_limit::EngineError;
use tier_limit::EngineSlot;
use tier_limit::IdentityResolver;
use tier_limit::Policy;
use tier_limit::PolicyCatalog;
use tier_limit::PrefixResolver;
use tier_limit::SystemClock;
use tracing::debug;
use tracing::warn;

use crate::decision::Outcome;
use crate::decision::RateLimitDecision;
use crate::metrics::GatewayMetrics;

/// Anything that kept the engine from answering. All of them degrade.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Fault {
    #[error(transparent)]
    Unavailable(EngineError),

    #[error("bucket engine did not answer within {0:?}")]
    Timeout(Duration),

    #[error("unexpected fault while consulting the bucket engine: {0}")]
    Unexpected(String),
}

impl From<EngineError> for Fault {
    fn from(err: EngineError) -> Self {
        if err.is_unavailable() {
            Fault::Unavailable(err)
        } else {
            Fault::Unexpected(err.to_string())
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic".to_string()
    }
}

/// Decides, per request, whether it is admitted.
///
/// Each decision is one pass: identify the caller, resolve the policy, consult
/// the engine, and map the result (or the failure) onto an [`Outcome`]. It
/// never fails; when the engine cannot answer, paid tiers are admitted and the
/// free tier is rejected.
#[derive(Debug)]
pub struct AdmissionGateway {
    engine: EngineSlot,
    resolver: Arc<dyn IdentityResolver>,
    catalog: Arc<PolicyCatalog>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    degraded_retry_after: Duration,
    metrics: GatewayMetrics,
}

impl AdmissionGateway {
    /// A gateway using the reference policies, the prefix resolver and the
    /// system clock.
    pub fn new(engine: EngineSlot) -> Self {
        Self {
            engine,
            resolver: Arc::new(PrefixResolver::default()),
            catalog: Arc::new(PolicyCatalog::default()),
            clock: Arc::new(SystemClock),
            timeout: Duration::from_millis(250),
            degraded_retry_after: Duration::from_secs(5),
            metrics: GatewayMetrics::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<PolicyCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound the time spent waiting for the engine.
    ///
    /// If the engine does not answer in time the request is degraded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry hint sent with requests rejected because the store is unavailable.
    pub fn with_degraded_retry_after(mut self, retry_after: Duration) -> Self {
        self.degraded_retry_after = retry_after;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }

    pub async fn decide(&self, credential: Option<&str>, endpoint: &str) -> RateLimitDecision {
        let tier = self.resolver.classify(credential);
        let policy = self.catalog.resolve(tier, endpoint);
        let key = BucketKey::new(credential, endpoint);

        let decision = match self.consult(&key, &policy).await {
            Ok(true) => RateLimitDecision::new(Outcome::Allow, tier, &policy, None),
            Ok(false) => RateLimitDecision::new(
                Outcome::Deny,
                tier,
                &policy,
                Some(policy.retry_after()),
            ),
            Err(fault) => {
                let decision = if tier.fails_open() {
                    RateLimitDecision::new(Outcome::DegradeOpen, tier, &policy, None)
                } else {
                    RateLimitDecision::new(
                        Outcome::DegradeClosed,
                        tier,
                        &policy,
                        Some(self.degraded_retry_after),
                    )
                };
                warn!(%fault, %tier, outcome = %decision.outcome, "rate limiting degraded");
                decision
            }
        };

        debug!(
            key = %key,
            tier = %tier,
            limit = decision.limit,
            outcome = %decision.outcome,
            "admission decided"
        );
        self.metrics.record(&decision);
        decision
    }

    async fn consult(&self, key: &BucketKey, policy: &Policy) -> Result<bool, Fault> {
        let engine = self.engine.get()?;
        let now = self.clock.now_seconds();

        let call = AssertUnwindSafe(engine.check_and_consume(key, policy, now)).catch_unwind();
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(Fault::Timeout(self.timeout)),
            Ok(Err(panic)) => Err(Fault::Unexpected(panic_message(panic))),
            Ok(Ok(result)) => Ok(result?),
        }
    }
}
