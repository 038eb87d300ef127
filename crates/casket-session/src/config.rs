//! Configuration for the session store.

use std::time::Duration;

/// Default number of CAS attempts before an acquisition gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(2);

/// Default ceiling on the retry delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(200);

/// Bounds the reload-and-retry loop of lock acquisition and owner-verified
/// header rewrites.
///
/// The delay starts at `initial_backoff` and doubles after every lost race,
/// capped at `max_backoff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRetryPolicy {
    /// Total CAS attempts, including the first. At least 1.
    pub max_attempts: u32,

    /// Delay after the first lost race.
    pub initial_backoff: Duration,

    /// Upper bound for the delay.
    pub max_backoff: Duration,
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl LockRetryPolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attempt bound. Zero is treated as one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the first retry delay.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the delay ceiling.
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Retry immediately, never sleeping.
    pub fn without_backoff(mut self) -> Self {
        self.initial_backoff = Duration::ZERO;
        self.max_backoff = Duration::ZERO;
        self
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1 << shift)
            .min(self.max_backoff)
    }
}

/// Configuration for a [`crate::SessionStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Deployment namespace prefixed to every key.
    pub namespace: String,

    /// Retry bounds for CAS loops.
    pub retry: LockRetryPolicy,
}

impl StoreConfig {
    /// Create a configuration for the given namespace with default retries.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            retry: LockRetryPolicy::default(),
        }
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: LockRetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
