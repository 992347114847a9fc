use std::collections::HashMap;
use std::fmt::Debug;

use crate::ConfigError;
use crate::Tier;

/// Maps a caller's credential onto a [`Tier`].
///
/// Implementations must be cheap and infallible: a credential that cannot be
/// classified belongs to [`Tier::Free`].
pub trait IdentityResolver: Debug + Send + Sync {
    fn classify(&self, credential: Option<&str>) -> Tier;
}

/// Classifies credentials by a fixed prefix convention, e.g. `premium_…`.
///
/// This does not authenticate anything. It stands in for a real
/// credential lookup.
#[derive(Debug, Clone)]
pub struct PrefixResolver {
    // Longest prefix first, so overlapping prefixes resolve to the most specific.
    rules: Vec<(String, Tier)>,
}

impl PrefixResolver {
    pub fn new<I, P>(rules: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (P, Tier)>,
        P: Into<String>,
    {
        let mut rules = rules
            .into_iter()
            .map(|(prefix, tier)| (prefix.into(), tier))
            .collect::<Vec<_>>();

        if let Some((prefix, _)) = rules.iter().find(|(prefix, _)| prefix.is_empty()) {
            return Err(ConfigError::InvalidPrefix {
                prefix: prefix.clone(),
                reason: "prefix must not be empty",
            });
        }

        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Ok(Self { rules })
    }

    /// Build from a `prefix -> tier` map, as found in configuration files.
    pub fn from_map(map: HashMap<String, Tier>) -> Result<Self, ConfigError> {
        Self::new(map)
    }
}

impl Default for PrefixResolver {
    fn default() -> Self {
        Self {
            rules: vec![
                ("enterprise_".to_string(), Tier::Enterprise),
                ("premium_".to_string(), Tier::Premium),
            ],
        }
    }
}

impl IdentityResolver for PrefixResolver {
    fn classify(&self, credential: Option<&str>) -> Tier {
        let Some(credential) = credential else {
            return Tier::Free;
        };
        self.rules
            .iter()
            .find(|(prefix, _)| credential.starts_with(prefix.as_str()))
            .map(|(_, tier)| *tier)
            .unwrap_or_default()
    }
}
