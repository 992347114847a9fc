use crate::Tier;

/// Failures reported by a [`crate::BucketStore`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached (connection refused, dropped, IO).
    #[error("bucket store unreachable: {0}")]
    Unreachable(String),

    /// The atomic check-and-consume operation is not registered with the store.
    #[error("check-and-consume script is not registered with the store")]
    ScriptMissing,

    /// The store answered, but not with something we understand.
    #[error("unexpected reply from bucket store: {0}")]
    Protocol(String),
}

impl StoreError {
    /// `true` when the failure means the store is (temporarily) unavailable,
    /// rather than that it misbehaved.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::ScriptMissing)
    }
}

/// Errors produced by the [`crate::BucketEngine`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The engine has not completed initialization, or initialization failed.
    #[error("bucket engine is not ready")]
    NotReady,

    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// `true` for the conditions that make up "engine unavailable".
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::NotReady => true,
            Self::Store(err) => err.is_unavailable(),
        }
    }
}

/// Errors raised while building configuration at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A policy table must always configure the `free` tier.
    #[error("policy table has no entry for the free tier")]
    MissingFreeTier,

    /// A policy failed validation.
    #[error("invalid policy for tier {tier} ({scope}): {reason}")]
    InvalidPolicy {
        tier: Tier,
        /// `default` or the endpoint path.
        scope: String,
        reason: &'static str,
    },

    /// A credential prefix mapping is unusable.
    #[error("invalid credential prefix {prefix:?}: {reason}")]
    InvalidPrefix { prefix: String, reason: &'static str },

    /// The configuration document could not be parsed.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<serde_path_to_error::Error<serde_json::Error>> for ConfigError {
    fn from(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = err.path().to_string();
        Self::Parse {
            path,
            source: err.into_inner(),
        }
    }
}
