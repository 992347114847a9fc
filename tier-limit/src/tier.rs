use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::de;

/// A named service class. Determines which set of policies applies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Premium,
    Enterprise,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Premium, Tier::Enterprise];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Enterprise => "enterprise",
        }
    }

    /// Paid tiers are admitted when the shared store cannot be consulted.
    pub const fn fails_open(&self) -> bool {
        !matches!(self, Tier::Free)
    }

    /// Parse a tier label, falling back to [`Tier::Free`] for anything unknown.
    pub fn parse_lenient(label: &str) -> Self {
        label.parse().unwrap_or_default()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a tier label is not one of the known tiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

// Read as a plain string rather than an enum, so that tiers used as map keys
// still show up in path-aware parse errors.
impl<'de> Deserialize<'de> for Tier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TierVisitor;

        impl de::Visitor<'_> for TierVisitor {
            type Value = Tier;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("one of `free`, `premium`, `enterprise`")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Tier, E> {
                v.parse()
                    .map_err(|_| E::unknown_variant(v, &["free", "premium", "enterprise"]))
            }
        }

        deserializer.deserialize_str(TierVisitor)
    }
}
