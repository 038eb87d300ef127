//! Common test utilities for session store integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use casket_kv::{KvClient, MemoryKvClient, Result, StoreMode, Versioned};
use casket_session::{LockRetryPolicy, SessionStore, StoreConfig};

/// Namespace used by every test store.
pub const NAMESPACE: &str = "Test Site+/";

/// Retry policy that never sleeps, keeping contention tests fast.
pub fn fast_retry(max_attempts: u32) -> LockRetryPolicy {
    LockRetryPolicy::new()
        .with_max_attempts(max_attempts)
        .without_backoff()
}

/// A store over a fresh in-memory client, plus the client for inspection.
pub fn memory_store() -> (Arc<SessionStore>, Arc<MemoryKvClient>) {
    let client = Arc::new(MemoryKvClient::new());
    let store = store_over(client.clone(), fast_retry(50));
    (Arc::new(store), client)
}

/// A store over an arbitrary client.
pub fn store_over(client: Arc<dyn KvClient>, retry: LockRetryPolicy) -> SessionStore {
    SessionStore::new(client, StoreConfig::new(NAMESPACE).with_retry(retry))
}

/// Client wrapper that loses CAS races on purpose.
///
/// For the next `times` compare-and-swap calls on keys containing `fragment`,
/// it first rewrites the key with its current value. The write bumps the
/// version, so the caller's CAS fails exactly as if another process had
/// written in between.
pub struct InterferingClient {
    inner: Arc<MemoryKvClient>,
    fragment: &'static str,
    remaining: AtomicU32,
    interfered: AtomicU32,
}

impl InterferingClient {
    pub fn new(inner: Arc<MemoryKvClient>, fragment: &'static str, times: u32) -> Self {
        Self {
            inner,
            fragment,
            remaining: AtomicU32::new(times),
            interfered: AtomicU32::new(0),
        }
    }

    /// Number of races lost so far.
    pub fn interfered(&self) -> u32 {
        self.interfered.load(Ordering::SeqCst)
    }

    fn take_interference(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl KvClient for InterferingClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn get_with_version(&self, key: &str) -> Result<Option<Versioned>> {
        self.inner.get_with_version(key).await
    }

    async fn store(
        &self,
        mode: StoreMode,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool> {
        self.inner.store(mode, key, value, ttl).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
        expected: u64,
    ) -> Result<bool> {
        if key.contains(self.fragment)
            && self.take_interference()
            && let Some(current) = self.inner.get(key).await?
        {
            self.inner.store(StoreMode::Set, key, &current, ttl).await?;
            self.interfered.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.compare_and_swap(key, value, ttl, expected).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.inner.remove(key).await
    }

    fn name(&self) -> &str {
        "interfering"
    }
}
