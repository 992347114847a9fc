use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::ConfigError;
use crate::PolicyCatalog;
use crate::PolicyTable;
use crate::PrefixResolver;
use crate::Tier;

/// Static configuration, loaded once at startup.
///
/// ```json
/// {
///   "policies": {
///     "free": { "default": { "capacity": 10, "refillRate": 1, "windowSeconds": 60 } }
///   },
///   "credentialPrefixes": { "premium_": "premium", "enterprise_": "enterprise" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierLimitConfig {
    pub policies: PolicyTable,
    #[serde(default = "default_prefixes")]
    pub credential_prefixes: HashMap<String, Tier>,
}

fn default_prefixes() -> HashMap<String, Tier> {
    HashMap::from([
        ("premium_".to_string(), Tier::Premium),
        ("enterprise_".to_string(), Tier::Enterprise),
    ])
}

impl TierLimitConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let de = &mut serde_json::Deserializer::from_str(json);
        Ok(serde_path_to_error::deserialize(de)?)
    }

    /// Validate everything and build the lookup structures.
    pub fn build(self) -> Result<(PolicyCatalog, PrefixResolver), ConfigError> {
        let catalog = PolicyCatalog::new(self.policies)?;
        let resolver = PrefixResolver::from_map(self.credential_prefixes)?;
        Ok((catalog, resolver))
    }
}
