//! CLI command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use casket_config::{BackendKind, CasketConfig};
use casket_kv::{KvBackend, OutputCache, SharedKvClient};
use casket_session::{LockRetryPolicy, SessionStore, StoreConfig};

pub mod cache;
pub mod config;
pub mod contend;
pub mod hit;
pub mod release;
pub mod remove;
pub mod reset_timeout;
pub mod show;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Resolved configuration, with command-line overrides applied.
    pub config: CasketConfig,
    /// File the configuration was loaded from.
    pub config_source: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Connect to the configured key/value backend.
    pub fn connect(&self) -> Result<SharedKvClient> {
        let backend = match self.config.client.backend {
            BackendKind::Memory => KvBackend::Memory,
            BackendKind::Sqlite => {
                let path = self
                    .config
                    .client
                    .path
                    .clone()
                    .context("[client] backend = \"sqlite\" requires a path")?;
                KvBackend::Sqlite { path }
            }
        };
        casket_kv::connect(&backend).context("Failed to open key/value backend")
    }

    /// Build a session store from the configuration.
    pub fn session_store(&self) -> Result<Arc<SessionStore>> {
        self.config.validate().context("Invalid configuration")?;

        let session = &self.config.session;
        let retry = LockRetryPolicy::new()
            .with_max_attempts(session.lock.max_attempts)
            .with_initial_backoff(session.lock.initial_backoff())
            .with_max_backoff(session.lock.max_backoff());
        let store_config = StoreConfig::new(&session.namespace).with_retry(retry);

        Ok(Arc::new(SessionStore::new(self.connect()?, store_config)))
    }

    /// Build an output cache over the configured backend.
    pub fn output_cache(&self) -> Result<OutputCache> {
        Ok(OutputCache::new(self.connect()?))
    }

    /// Timeout to use when a command doesn't specify one.
    pub fn default_timeout(&self) -> u32 {
        self.config.session.default_timeout_minutes
    }
}
