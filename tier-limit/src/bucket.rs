use std::fmt;

/// Identifies one bucket: who is calling, and which endpoint they call.
///
/// Callers without a credential share one bucket per endpoint. Their identity
/// segment is empty, so no presented credential can land in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    identity: Option<String>,
    endpoint: String,
}

impl BucketKey {
    /// An empty credential counts as no credential.
    pub fn new(credential: Option<&str>, endpoint: &str) -> Self {
        Self {
            identity: credential.filter(|c| !c.is_empty()).map(str::to_string),
            endpoint: endpoint.to_string(),
        }
    }

    /// The credential, or `None` for an anonymous caller.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.identity.is_none()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Display for BucketKey {
    /// The key under which the bucket is stored.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identity = self.identity.as_deref().unwrap_or_default();
        write!(f, "tb:{}:{}", identity, self.endpoint)
    }
}

/// Persisted state of one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    pub tokens: f64,
    /// Epoch seconds of the last refill.
    pub last_refill: u64,
}

impl BucketState {
    /// A bucket observed for the first time starts full.
    pub fn full(capacity: u32, now: u64) -> Self {
        Self {
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    /// Refill for the time elapsed since the last refill, then try to take one token.
    ///
    /// Time running backwards adds nothing and never moves `last_refill` back.
    /// The refreshed count is kept even when no token is taken.
    pub fn refill_and_consume(&mut self, capacity: u32, refill_rate: f64, now: u64) -> bool {
        let elapsed = now.saturating_sub(self.last_refill) as f64;
        let refreshed = (self.tokens + elapsed * refill_rate)
            .min(f64::from(capacity))
            .max(0.0);

        self.last_refill = self.last_refill.max(now);

        if refreshed >= 1.0 {
            self.tokens = refreshed - 1.0;
            true
        } else {
            self.tokens = refreshed;
            false
        }
    }
}
