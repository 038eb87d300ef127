//! Pass-through page output cache.
//!
//! Entries are opaque byte blobs stored directly under the caller's key with
//! an absolute UTC expiry. No locking is involved.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::client::{SharedKvClient, StoreMode};
use crate::error::Result;

/// Output cache over a shared [`crate::KvClient`].
#[derive(Clone)]
pub struct OutputCache {
    client: SharedKvClient,
}

impl std::fmt::Debug for OutputCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCache")
            .field("backend", &self.client.name())
            .finish()
    }
}

/// Time left until `expiry`, or `None` if it has already passed.
fn ttl_until(expiry: DateTime<Utc>) -> Option<Duration> {
    (expiry - Utc::now())
        .to_std()
        .ok()
        .filter(|ttl| !ttl.is_zero())
}

impl OutputCache {
    /// Create an output cache using the given client.
    pub fn new(client: SharedKvClient) -> Self {
        Self { client }
    }

    /// Store `entry` only if nothing is cached under `key`.
    ///
    /// Returns `None` when `entry` was stored, or the entry already cached.
    /// If the existing entry disappears between the add and the read-back,
    /// `entry` is written unconditionally and `None` is returned.
    pub async fn add(
        &self,
        key: &str,
        entry: &[u8],
        utc_expiry: DateTime<Utc>,
    ) -> Result<Option<Vec<u8>>> {
        let Some(ttl) = ttl_until(utc_expiry) else {
            debug!(key = %key, "Output cache add skipped, expiry already passed");
            return Ok(None);
        };

        if self.client.store(StoreMode::Add, key, entry, ttl).await? {
            return Ok(None);
        }

        match self.client.get(key).await? {
            Some(existing) => Ok(Some(existing)),
            None => {
                trace!(key = %key, "Existing entry evicted during add, storing anyway");
                self.client.store(StoreMode::Set, key, entry, ttl).await?;
                Ok(None)
            }
        }
    }

    /// Read a cached entry.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.client.get(key).await
    }

    /// Store `entry` unconditionally.
    pub async fn set(&self, key: &str, entry: &[u8], utc_expiry: DateTime<Utc>) -> Result<()> {
        match ttl_until(utc_expiry) {
            Some(ttl) => {
                self.client.store(StoreMode::Set, key, entry, ttl).await?;
            }
            None => {
                // An already-expired entry replaces nothing useful; drop what's there.
                self.client.remove(key).await?;
            }
        }
        Ok(())
    }

    /// Remove a cached entry.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.client.remove(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;

    use super::*;
    use crate::MemoryKvClient;

    fn cache() -> OutputCache {
        OutputCache::new(Arc::new(MemoryKvClient::new()))
    }

    fn in_minutes(m: i64) -> DateTime<Utc> {
        Utc::now() + TimeDelta::minutes(m)
    }

    #[tokio::test]
    async fn test_add_stores_when_absent() {
        let cache = cache();
        let result = cache.add("page:/", b"<html>", in_minutes(5)).await.unwrap();

        assert_eq!(result, None);
        assert_eq!(cache.get("page:/").await.unwrap(), Some(b"<html>".to_vec()));
    }

    #[tokio::test]
    async fn test_add_returns_existing_entry() {
        let cache = cache();
        cache.add("page:/", b"first", in_minutes(5)).await.unwrap();

        let result = cache.add("page:/", b"second", in_minutes(5)).await.unwrap();
        assert_eq!(result, Some(b"first".to_vec()));
        assert_eq!(cache.get("page:/").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn test_set_and_remove() {
        let cache = cache();
        cache.set("page:/", b"a", in_minutes(5)).await.unwrap();
        cache.set("page:/", b"b", in_minutes(5)).await.unwrap();
        assert_eq!(cache.get("page:/").await.unwrap(), Some(b"b".to_vec()));

        cache.remove("page:/").await.unwrap();
        assert_eq!(cache.get("page:/").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_past_expiry_is_not_stored() {
        let cache = cache();
        assert_eq!(cache.add("page:/", b"a", in_minutes(-1)).await.unwrap(), None);
        assert_eq!(cache.get("page:/").await.unwrap(), None);

        cache.set("page:/", b"a", in_minutes(5)).await.unwrap();
        cache.set("page:/", b"b", in_minutes(-1)).await.unwrap();
        assert_eq!(cache.get("page:/").await.unwrap(), None);
    }
}
