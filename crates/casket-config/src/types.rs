//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [session]                # key namespace, default timeout
//! [session.lock]           # lock acquisition retry policy
//! [client]                 # key/value backend selection
//! [logging]                # optional JSON log directory
//! ```
//!
//! Unknown keys anywhere in the file are rejected.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CasketConfig {
    /// Session storage settings.
    pub session: SessionConfig,

    /// Key/value backend settings.
    pub client: ClientConfig,

    /// Log output settings.
    pub logging: LoggingConfig,
}

impl CasketConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check values that parse fine but can't be used.
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.client.validate()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default session timeout in minutes.
pub const DEFAULT_TIMEOUT_MINUTES: u32 = 20;

/// Session storage configuration.
///
/// ```toml
/// [session]
/// namespace = "shop-frontend"
/// default_timeout_minutes = 20
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Deployment identity prefixed to every session key. Must be stable for
    /// the deployment and distinct from every other deployment sharing the
    /// same cache.
    pub namespace: String,

    /// Timeout for newly created sessions.
    pub default_timeout_minutes: u32,

    /// Lock acquisition retry policy.
    pub lock: LockConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            default_timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            lock: LockConfig::default(),
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "namespace".to_string(),
                context: "[session]".to_string(),
            });
        }
        if self.default_timeout_minutes == 0 {
            return Err(invalid(
                "session.default_timeout_minutes",
                "must be at least 1",
            ));
        }
        self.lock.validate()
    }
}

/// Retry policy for exclusive lock acquisition.
///
/// ```toml
/// [session.lock]
/// max_attempts = 50
/// initial_backoff_ms = 2
/// max_backoff_ms = 200
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    /// Maximum CAS attempts before giving up.
    pub max_attempts: u32,
    /// Delay after the first lost CAS race, doubled on each retry.
    pub initial_backoff_ms: u64,
    /// Upper bound on the retry delay.
    pub max_backoff_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            initial_backoff_ms: 2,
            max_backoff_ms: 200,
        }
    }
}

impl LockConfig {
    /// Initial backoff as a duration.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Maximum backoff as a duration.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(invalid("session.lock.max_attempts", "must be at least 1"));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(invalid(
                "session.lock.initial_backoff_ms",
                "must not exceed max_backoff_ms",
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Key/value backend kind.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process store; only useful within a single process.
    #[default]
    Memory,
    /// SQLite database file shared between processes.
    Sqlite,
}

/// Key/value backend configuration.
///
/// ```toml
/// [client]
/// backend = "sqlite"
/// path = "/var/lib/casket/kv.sqlite3"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Which backend to use.
    pub backend: BackendKind,
    /// Database path for the `sqlite` backend.
    pub path: Option<PathBuf>,
}

impl ClientConfig {
    fn validate(&self) -> Result<()> {
        if self.backend == BackendKind::Sqlite && self.path.is_none() {
            return Err(ConfigError::MissingField {
                field: "path".to_string(),
                context: "[client] with backend = \"sqlite\"".to_string(),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Log output configuration.
///
/// ```toml
/// [logging]
/// dir = "/var/log/casket"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Directory for daily-rotated JSON log files. Console-only when unset.
    pub dir: Option<PathBuf>,
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
