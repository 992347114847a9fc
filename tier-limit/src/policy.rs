use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::ConfigError;
use crate::Tier;

/// Upper bound on how long an idle bucket is kept, and on any retry hint.
pub const MAX_BUCKET_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Token bucket parameters for one (tier, endpoint) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Maximum number of tokens the bucket holds.
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_rate: f64,
    /// Nominal window, used in messages and as the lower bound of the bucket TTL.
    pub window_seconds: u64,
}

impl Policy {
    pub const fn new(capacity: u32, refill_rate: f64, window_seconds: u64) -> Self {
        Self {
            capacity,
            refill_rate,
            window_seconds,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.capacity == 0 {
            return Err("capacity must be greater than zero");
        }
        if !self.refill_rate.is_finite() || self.refill_rate < 0.0 {
            return Err("refillRate must be a finite, non-negative number");
        }
        if self.window_seconds == 0 {
            return Err("windowSeconds must be greater than zero");
        }
        Ok(())
    }

    /// How long an idle bucket is kept in the store.
    ///
    /// Long enough for an empty bucket to refill completely, and never shorter
    /// than the window. A bucket that never refills lives for one window.
    /// Capped at [`MAX_BUCKET_TTL`].
    pub fn ttl(&self) -> Duration {
        let refill_secs = if self.refill_rate > 0.0 {
            capped_secs(f64::from(self.capacity) / self.refill_rate)
        } else {
            0
        };
        Duration::from_secs(refill_secs.max(self.window_seconds)).min(MAX_BUCKET_TTL)
    }

    /// Time until an empty bucket holds one whole token again.
    pub fn retry_after(&self) -> Duration {
        let secs = if self.refill_rate > 0.0 {
            capped_secs(1.0 / self.refill_rate).max(1)
        } else {
            self.window_seconds
        };
        Duration::from_secs(secs).min(MAX_BUCKET_TTL)
    }
}

fn capped_secs(secs: f64) -> u64 {
    let max = MAX_BUCKET_TTL.as_secs();
    if secs >= max as f64 {
        max
    } else {
        secs.ceil() as u64
    }
}

/// Policies for a single tier: a default plus per-endpoint overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPolicies {
    pub default: Policy,
    #[serde(default)]
    pub endpoints: HashMap<String, Policy>,
}

impl TierPolicies {
    pub fn new(default: Policy) -> Self {
        Self {
            default,
            endpoints: HashMap::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>, policy: Policy) -> Self {
        self.endpoints.insert(endpoint.into(), policy);
        self
    }
}

/// The raw, unvalidated configuration surface.
pub type PolicyTable = HashMap<Tier, TierPolicies>;

/// Validated, immutable lookup from (tier, endpoint) to [`Policy`].
///
/// Resolution never fails: an unconfigured endpoint uses the tier default and
/// an unconfigured tier uses the free tier's policies.
#[derive(Debug, Clone)]
pub struct PolicyCatalog {
    tiers: HashMap<Tier, TierPolicies>,
    fallback: TierPolicies,
}

impl PolicyCatalog {
    pub fn new(table: PolicyTable) -> Result<Self, ConfigError> {
        for (tier, policies) in &table {
            policies
                .default
                .validate()
                .map_err(|reason| ConfigError::InvalidPolicy {
                    tier: *tier,
                    scope: "default".to_string(),
                    reason,
                })?;
            for (endpoint, policy) in &policies.endpoints {
                policy
                    .validate()
                    .map_err(|reason| ConfigError::InvalidPolicy {
                        tier: *tier,
                        scope: endpoint.clone(),
                        reason,
                    })?;
            }
        }

        let fallback = table
            .get(&Tier::Free)
            .cloned()
            .ok_or(ConfigError::MissingFreeTier)?;

        Ok(Self {
            tiers: table,
            fallback,
        })
    }

    /// Parse and validate a JSON policy table.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let de = &mut serde_json::Deserializer::from_str(json);
        let table: PolicyTable = serde_path_to_error::deserialize(de)?;
        Self::new(table)
    }

    pub fn resolve(&self, tier: Tier, endpoint: &str) -> Policy {
        let policies = self.tiers.get(&tier).unwrap_or(&self.fallback);
        policies
            .endpoints
            .get(endpoint)
            .copied()
            .unwrap_or(policies.default)
    }
}

impl Default for PolicyCatalog {
    /// The reference configuration.
    fn default() -> Self {
        let tier = |default, data, health, root| {
            TierPolicies::new(default)
                .with_endpoint("/api/data", data)
                .with_endpoint("/api/health", health)
                .with_endpoint("/", root)
        };

        let free = tier(
            Policy::new(10, 1.0, 60),
            Policy::new(5, 0.5, 60),
            Policy::new(30, 10.0, 60),
            Policy::new(20, 5.0, 60),
        );

        let mut tiers = HashMap::new();
        tiers.insert(Tier::Free, free.clone());
        tiers.insert(
            Tier::Premium,
            tier(
                Policy::new(100, 10.0, 60),
                Policy::new(50, 5.0, 60),
                Policy::new(1000, 100.0, 60),
                Policy::new(200, 20.0, 60),
            ),
        );
        tiers.insert(
            Tier::Enterprise,
            tier(
                Policy::new(1000, 100.0, 60),
                Policy::new(500, 50.0, 60),
                Policy::new(10000, 1000.0, 60),
                Policy::new(2000, 200.0, 60),
            ),
        );

        Self {
            tiers,
            fallback: free,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_resolves_exact_endpoints_first() {
        let catalog = PolicyCatalog::default();
        assert_eq!(
            catalog.resolve(Tier::Free, "/api/data"),
            Policy::new(5, 0.5, 60)
        );
        assert_eq!(
            catalog.resolve(Tier::Enterprise, "/api/health"),
            Policy::new(10000, 1000.0, 60)
        );
    }

    #[test]
    fn unconfigured_endpoints_use_the_tier_default() {
        let catalog = PolicyCatalog::default();
        assert_eq!(
            catalog.resolve(Tier::Free, "/api/status"),
            Policy::new(10, 1.0, 60)
        );
        assert_eq!(
            catalog.resolve(Tier::Premium, "/nowhere"),
            Policy::new(100, 10.0, 60)
        );
    }

    #[test]
    fn unconfigured_tiers_use_free() {
        let mut table = PolicyTable::new();
        table.insert(
            Tier::Free,
            TierPolicies::new(Policy::new(3, 1.0, 10)).with_endpoint("/x", Policy::new(1, 0.0, 5)),
        );
        let catalog = PolicyCatalog::new(table).unwrap();

        assert_eq!(
            catalog.resolve(Tier::Enterprise, "/x"),
            Policy::new(1, 0.0, 5)
        );
        assert_eq!(
            catalog.resolve(Tier::Premium, "/y"),
            Policy::new(3, 1.0, 10)
        );
    }

    #[test]
    fn it_rejects_a_table_without_free() {
        let mut table = PolicyTable::new();
        table.insert(Tier::Premium, TierPolicies::new(Policy::new(3, 1.0, 10)));
        assert!(matches!(
            PolicyCatalog::new(table),
            Err(ConfigError::MissingFreeTier)
        ));
    }

    #[test]
    fn it_rejects_invalid_policies() {
        let cases = [
            Policy::new(0, 1.0, 60),
            Policy::new(10, -1.0, 60),
            Policy::new(10, f64::NAN, 60),
            Policy::new(10, 1.0, 0),
        ];
        for bad in cases {
            let mut table = PolicyTable::new();
            table.insert(
                Tier::Free,
                TierPolicies::new(Policy::new(10, 1.0, 60)).with_endpoint("/bad", bad),
            );
            match PolicyCatalog::new(table) {
                Err(ConfigError::InvalidPolicy { tier, scope, .. }) => {
                    assert_eq!(tier, Tier::Free);
                    assert_eq!(scope, "/bad");
                }
                other => panic!("expected InvalidPolicy for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn it_parses_json_tables() {
        let json = r#"{
            "free": {
                "default": { "capacity": 10, "refillRate": 1, "windowSeconds": 60 },
                "endpoints": {
                    "/api/data": { "capacity": 5, "refillRate": 0.5, "windowSeconds": 60 }
                }
            },
            "premium": {
                "default": { "capacity": 100, "refillRate": 10, "windowSeconds": 60 }
            }
        }"#;
        let catalog = PolicyCatalog::from_json(json).unwrap();
        assert_eq!(
            catalog.resolve(Tier::Free, "/api/data"),
            Policy::new(5, 0.5, 60)
        );
        assert_eq!(
            catalog.resolve(Tier::Premium, "/api/data"),
            Policy::new(100, 10.0, 60)
        );
    }

    #[test]
    fn json_errors_name_the_offending_path() {
        let json = r#"{ "free": { "default": { "capacity": "ten", "refillRate": 1, "windowSeconds": 60 } } }"#;
        match PolicyCatalog::from_json(json) {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, "free.default.capacity"),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn ttl_outlives_a_full_refill() {
        assert_eq!(Policy::new(10, 1.0, 5).ttl(), Duration::from_secs(10));
        assert_eq!(Policy::new(10, 1.0, 60).ttl(), Duration::from_secs(60));
        assert_eq!(Policy::new(5, 0.0, 30).ttl(), Duration::from_secs(30));
        assert_eq!(Policy::new(1000, 3.0, 60).ttl(), Duration::from_secs(334));
    }

    #[test]
    fn tiny_refill_rates_keep_ttl_bounded() {
        let policy = Policy::new(u32::MAX, f64::MIN_POSITIVE, 60);
        assert_eq!(policy.ttl(), MAX_BUCKET_TTL);
        assert_eq!(policy.retry_after(), MAX_BUCKET_TTL);

        let policy = Policy::new(10, 1e-9, 60);
        assert_eq!(policy.ttl(), MAX_BUCKET_TTL);
        assert_eq!(Policy::new(10, 1.0, u64::MAX).ttl(), MAX_BUCKET_TTL);
    }

    #[test]
    fn retry_after_is_time_to_one_token() {
        assert_eq!(Policy::new(5, 0.5, 60).retry_after(), Duration::from_secs(2));
        assert_eq!(Policy::new(5, 100.0, 60).retry_after(), Duration::from_secs(1));
        assert_eq!(Policy::new(5, 0.0, 60).retry_after(), Duration::from_secs(60));
    }
}
