//! Versioned key/value client abstraction for Casket.
//!
//! This crate provides:
//! - The [`KvClient`] trait: get, versioned get, set/add, compare-and-swap, remove
//! - [`MemoryKvClient`] for in-process use and tests
//! - [`SqliteKvClient`] for state shared by processes on one host
//! - [`OutputCache`], a lock-free pass-through page cache
//!
//! Backends are selected explicitly with [`connect`].
//!
//! # Example
//!
//! ```rust,ignore
//! use casket_kv::{connect, KvBackend, StoreMode};
//!
//! let client = connect(&KvBackend::Memory)?;
//! client.store(StoreMode::Set, "key", b"value", ttl).await?;
//! ```

mod client;
mod error;
mod memory;
mod output_cache;
mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

pub use client::{KvClient, MAX_KEY_LEN, SharedKvClient, StoreMode, Versioned, validate_key};
pub use error::{KvError, Result};
pub use memory::MemoryKvClient;
pub use output_cache::OutputCache;
pub use sqlite::SqliteKvClient;

/// Which backend [`connect`] should build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvBackend {
    /// In-process map; state is lost when the process exits.
    Memory,
    /// SQLite database file shared between processes.
    Sqlite { path: PathBuf },
}

/// Build a client for the given backend.
pub fn connect(backend: &KvBackend) -> Result<SharedKvClient> {
    let client: SharedKvClient = match backend {
        KvBackend::Memory => Arc::new(MemoryKvClient::new()),
        KvBackend::Sqlite { path } => Arc::new(SqliteKvClient::open(path)?),
    };

    info!(backend = client.name(), "KV client connected");
    Ok(client)
}
