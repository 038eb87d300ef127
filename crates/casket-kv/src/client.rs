//! Key/value client trait.
//!
//! This is the minimal contract the session layer needs from a shared cache:
//! plain reads, versioned reads, unconditional/add-only stores, and
//! compare-and-swap writes keyed by the version captured at read time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{KvError, Result};

/// Longest key accepted by any backend (memcached's limit).
pub const MAX_KEY_LEN: usize = 250;

/// How [`KvClient::store`] treats an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Write unconditionally, replacing any existing value.
    Set,
    /// Write only if no live value exists under the key.
    Add,
}

/// A value read together with its CAS version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    /// Stored bytes.
    pub value: Vec<u8>,
    /// Version token; changes on every successful write to the key.
    pub cas: u64,
}

/// Versioned key/value store shared between processes.
///
/// A `ttl` of [`Duration::ZERO`] means the entry never expires. Entries whose
/// TTL has elapsed are indistinguishable from absent ones.
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Read a value along with its current CAS version.
    async fn get_with_version(&self, key: &str) -> Result<Option<Versioned>>;

    /// Write a value. Returns `false` when `mode` is [`StoreMode::Add`] and
    /// the key already holds a live value.
    async fn store(&self, mode: StoreMode, key: &str, value: &[u8], ttl: Duration)
    -> Result<bool>;

    /// Write a value only if its version still equals `expected`.
    ///
    /// Returns `false` on version mismatch or when the key is absent.
    async fn compare_and_swap(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        expected: u64,
    ) -> Result<bool>;

    /// Delete a value. Returns whether a live value was removed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Shared, dynamically dispatched client handle.
pub type SharedKvClient = Arc<dyn KvClient>;

/// Check that a key is acceptable to every backend.
pub fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        "key is empty"
    } else if key.len() > MAX_KEY_LEN {
        "key exceeds 250 bytes"
    } else if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        "key contains whitespace or control characters"
    } else {
        return Ok(());
    };

    Err(KvError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_accepts_namespaced_keys() {
        assert!(validate_key("my-site+/app+info-abc123").is_ok());
    }

    #[test]
    fn test_validate_key_rejects_bad_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key("has space").is_err());
        assert!(validate_key("tab\there").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN)).is_ok());
    }
}
