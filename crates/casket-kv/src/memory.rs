//! In-process key/value backend.
//!
//! Behaves like a single memcached node: every successful write stamps the
//! entry with a fresh CAS version from a global counter, and entries past
//! their TTL are treated as absent and purged lazily.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::client::{KvClient, StoreMode, Versioned, validate_key};
use crate::error::Result;

/// A stored value with its version and expiry.
#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    cas: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Next CAS version to hand out. Starts at 1 so versions are never zero.
    next_cas: u64,
}

impl Inner {
    fn next_cas(&mut self) -> u64 {
        let cas = self.next_cas;
        self.next_cas += 1;
        cas
    }

    /// Look up a live entry, dropping it if it has expired.
    fn live(&mut self, key: &str, now: Instant) -> Option<&Entry> {
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            trace!(key = %key, "Entry expired, purging");
            self.entries.remove(key);
        }
        self.entries.get(key)
    }

    fn put(&mut self, key: &str, value: &[u8], ttl: Duration, now: Instant) -> u64 {
        let cas = self.next_cas();
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                cas,
                expires_at: expiry(ttl, now),
            },
        );
        cas
    }
}

fn expiry(ttl: Duration, now: Instant) -> Option<Instant> {
    if ttl.is_zero() { None } else { Some(now + ttl) }
}

/// In-memory [`KvClient`] with CAS versions and TTL expiry.
///
/// Shared between tasks of one process; useful for tests and single-node
/// deployments.
#[derive(Debug)]
pub struct MemoryKvClient {
    inner: Mutex<Inner>,
}

impl Default for MemoryKvClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKvClient {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next_cas: 1,
            }),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// Check if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of a live entry. `Some(None)` means it never expires.
    pub fn ttl_of(&self, key: &str) -> Option<Option<Duration>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner
            .live(key, now)
            .map(|e| e.expires_at.map(|at| at.saturating_duration_since(now)))
    }

    /// Remove all expired entries and return how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.is_live(now));
        let purged = before - inner.entries.len();

        if purged > 0 {
            debug!(count = purged, "Purged expired entries");
        }

        purged
    }
}

#[async_trait]
impl KvClient for MemoryKvClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get_with_version(key).await?.map(|v| v.value))
    }

    async fn get_with_version(&self, key: &str) -> Result<Option<Versioned>> {
        validate_key(key)?;
        let mut inner = self.inner.lock();
        Ok(inner.live(key, Instant::now()).map(|e| Versioned {
            value: e.value.clone(),
            cas: e.cas,
        }))
    }

    async fn store(
        &self,
        mode: StoreMode,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool> {
        validate_key(key)?;
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if mode == StoreMode::Add && inner.live(key, now).is_some() {
            trace!(key = %key, "Add rejected, key exists");
            return Ok(false);
        }

        let cas = inner.put(key, value, ttl, now);
        trace!(key = %key, cas = cas, ?mode, "Stored entry");
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        expected: u64,
    ) -> Result<bool> {
        validate_key(key)?;
        let now = Instant::now();
        let mut inner = self.inner.lock();

        match inner.live(key, now).map(|e| e.cas) {
            Some(actual) if actual == expected => {
                let cas = inner.put(key, value, ttl, now);
                trace!(key = %key, expected = expected, cas = cas, "CAS succeeded");
                Ok(true)
            }
            Some(actual) => {
                trace!(key = %key, expected = expected, actual = actual, "CAS version mismatch");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let now = Instant::now();
        let mut inner = self.inner.lock();
        Ok(inner.entries.remove(key).is_some_and(|e| e.is_live(now)))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
