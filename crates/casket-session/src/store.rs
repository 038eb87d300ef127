//! The session store: advisory exclusive locking over a CAS key/value cache.
//!
//! Each session lives in two cache entries, a small header carrying the lock
//! state and a data entry carrying the serialized items. The lock is taken
//! by CAS-writing the header with the version read a moment earlier; that
//! version doubles as the lock id, so every acquisition gets a fresh token.
//!
//! Nothing here blocks on the cache. Lost races are retried a bounded number
//! of times with exponential backoff; ownership mismatches are reported as
//! outcomes rather than errors.

use std::time::Duration;

use casket_kv::{SharedKvClient, StoreMode};
use chrono::Utc;
use tracing::{debug, trace, warn};

use crate::codec::{decode_data, decode_header, encode_data, encode_header};
use crate::config::{LockRetryPolicy, StoreConfig};
use crate::error::{Result, SessionError};
use crate::items::SessionItems;
use crate::keys::{KeyDeriver, SessionKeys};
use crate::record::{LockId, SessionAction, SessionHeader, SessionRecord};
use crate::ttl::validate_timeout;

/// Result of [`SessionStore::try_acquire_exclusive`].
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    /// The caller now holds the lock.
    Acquired {
        /// The session as read just before locking, with the new lock state.
        record: SessionRecord,
        /// Token to present on commit, release or removal.
        lock_id: LockId,
        /// The flag the session carried before acquisition.
        pending: SessionAction,
    },
    /// Someone else holds the lock.
    Contended {
        /// Current holder.
        owner: LockId,
        /// Time since the holder took the lock.
        age: Duration,
    },
    /// Every attempt lost a race against another writer.
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
    /// No session under this id.
    NotFound,
}

impl AcquireOutcome {
    /// The lock id if the lock was acquired.
    pub fn lock_id(&self) -> Option<LockId> {
        match self {
            Self::Acquired { lock_id, .. } => Some(*lock_id),
            _ => None,
        }
    }
}

/// Result of [`SessionStore::commit_and_release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Data and header written, lock released.
    Committed,
    /// The caller no longer holds the lock, or the session is gone. Nothing
    /// was written unless a header rewrite lost its lock after the data write.
    LockLost,
    /// The data entry changed underneath the lock holder. Nothing was written.
    Conflict,
}

/// Session store over a shared key/value client.
pub struct SessionStore {
    client: SharedKvClient,
    keys: KeyDeriver,
    retry: LockRetryPolicy,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("client", &self.client.name())
            .field("namespace", &self.keys.namespace())
            .field("retry", &self.retry)
            .finish()
    }
}

impl SessionStore {
    /// Create a store using the given client.
    pub fn new(client: SharedKvClient, config: StoreConfig) -> Self {
        Self {
            client,
            keys: KeyDeriver::new(&config.namespace),
            retry: config.retry,
        }
    }

    /// The key deriver in use.
    pub fn keys(&self) -> &KeyDeriver {
        &self.keys
    }

    /// The underlying client.
    pub fn client(&self) -> &SharedKvClient {
        &self.client
    }

    /// The retry policy in use.
    pub fn retry_policy(&self) -> &LockRetryPolicy {
        &self.retry
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Read a session.
    ///
    /// With `meta_only` only the header is read and `items` is empty. A full
    /// load returns `None` unless both entries are present and decodable.
    pub async fn load(&self, session_id: &str, meta_only: bool) -> Result<Option<SessionRecord>> {
        let keys = self.keys.derive(session_id);

        let Some((header, header_version)) = self.read_header(session_id, &keys).await? else {
            return Ok(None);
        };

        if meta_only {
            return Ok(Some(SessionRecord {
                session_id: session_id.to_string(),
                header,
                items: SessionItems::new(),
                header_version,
                data_version: None,
            }));
        }

        let Some((items, data_version)) = self.read_data(session_id, &keys).await? else {
            debug!(session_id = %session_id, "Session header without data, treating as absent");
            return Ok(None);
        };

        Ok(Some(SessionRecord {
            session_id: session_id.to_string(),
            header,
            items,
            header_version,
            data_version: Some(data_version),
        }))
    }

    async fn read_header(
        &self,
        session_id: &str,
        keys: &SessionKeys,
    ) -> Result<Option<(SessionHeader, u64)>> {
        let Some(entry) = self.client.get_with_version(&keys.header).await? else {
            return Ok(None);
        };
        match decode_header(&entry.value) {
            Ok(header) => Ok(Some((header, entry.cas))),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Unreadable session header, treating as absent");
                Ok(None)
            }
        }
    }

    async fn read_data(
        &self,
        session_id: &str,
        keys: &SessionKeys,
    ) -> Result<Option<(SessionItems, u64)>> {
        let Some(entry) = self.client.get_with_version(&keys.data).await? else {
            return Ok(None);
        };
        match decode_data(&entry.value) {
            Ok(items) => Ok(Some((items, entry.cas))),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Unreadable session data, treating as absent");
                Ok(None)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an empty, unlocked session flagged for initialization.
    ///
    /// Overwrites whatever was stored under the id.
    pub async fn create_uninitialized(&self, session_id: &str, timeout_minutes: u32) -> Result<()> {
        validate_timeout(timeout_minutes)?;
        let keys = self.keys.derive(session_id);
        let header = SessionHeader::uninitialized(timeout_minutes);

        self.write_unconditionally(&keys, &header, &SessionItems::new())
            .await?;
        debug!(session_id = %session_id, timeout_minutes, "Created uninitialized session");
        Ok(())
    }

    /// Take the session's exclusive lock.
    ///
    /// Returns `Contended` without retrying when the lock is already held.
    /// Lost CAS races reload and retry until the retry policy is exhausted.
    pub async fn try_acquire_exclusive(&self, session_id: &str) -> Result<AcquireOutcome> {
        let keys = self.keys.derive(session_id);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let Some(record) = self.load(session_id, false).await? else {
                return Ok(AcquireOutcome::NotFound);
            };

            if let Some(owner) = record.header.lock_owner {
                let age = record.lock_age();
                trace!(session_id = %session_id, lock_id = %owner, ?age, "Session locked by another holder");
                return Ok(AcquireOutcome::Contended { owner, age });
            }

            let lock_id = LockId::new(record.header_version)
                .ok_or_else(|| SessionError::ZeroVersion(keys.header.clone()))?;
            let pending = record.header.flag;

            let mut header = record.header.clone();
            header.lock(lock_id, Utc::now());
            header.flag = SessionAction::None;

            if self
                .client
                .compare_and_swap(
                    &keys.header,
                    &encode_header(&header),
                    header.ttl(),
                    record.header_version,
                )
                .await?
            {
                debug!(session_id = %session_id, lock_id = %lock_id, attempt, "Acquired session lock");
                return Ok(AcquireOutcome::Acquired {
                    record: SessionRecord { header, ..record },
                    lock_id,
                    pending,
                });
            }

            if attempt >= self.retry.max_attempts {
                warn!(
                    session_id = %session_id,
                    attempts = attempt,
                    "Gave up acquiring session lock after repeated CAS conflicts"
                );
                return Ok(AcquireOutcome::Exhausted { attempts: attempt });
            }

            let backoff = self.retry.backoff_for(attempt);
            debug!(
                session_id = %session_id,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "Header changed during acquisition, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Release a lock held under `lock_id`.
    ///
    /// Returns `false`, writing nothing, when the session is gone or the lock
    /// belongs to someone else.
    pub async fn release_exclusive(&self, session_id: &str, lock_id: LockId) -> Result<bool> {
        let keys = self.keys.derive(session_id);
        let released = self
            .rewrite_owned_header(session_id, &keys, lock_id, None, |header| {
                let mut header = header.clone();
                header.release();
                header
            })
            .await?;

        if released {
            debug!(session_id = %session_id, lock_id = %lock_id, "Released session lock");
        } else {
            debug!(session_id = %session_id, lock_id = %lock_id, "Release ignored, lock not held");
        }
        Ok(released)
    }

    /// Write new items and timeout, releasing the lock.
    ///
    /// With `is_new_item` both entries are written unconditionally and
    /// `lock_id` is ignored. Otherwise the session is reloaded, ownership
    /// verified, and data then header written with CAS against the versions
    /// just read. The written header is unlocked with no pending action.
    pub async fn commit_and_release(
        &self,
        session_id: &str,
        lock_id: Option<LockId>,
        items: &SessionItems,
        timeout_minutes: u32,
        is_new_item: bool,
    ) -> Result<CommitOutcome> {
        validate_timeout(timeout_minutes)?;
        let keys = self.keys.derive(session_id);
        let header = SessionHeader::unlocked(timeout_minutes);

        if is_new_item {
            self.write_unconditionally(&keys, &header, items).await?;
            debug!(session_id = %session_id, items = items.len(), "Committed new session");
            return Ok(CommitOutcome::Committed);
        }

        let Some(lock_id) = lock_id else {
            return Ok(CommitOutcome::LockLost);
        };

        let Some(record) = self.load(session_id, false).await? else {
            debug!(session_id = %session_id, lock_id = %lock_id, "Commit skipped, session gone");
            return Ok(CommitOutcome::LockLost);
        };
        if record.header.lock_owner != Some(lock_id) {
            debug!(
                session_id = %session_id,
                lock_id = %lock_id,
                owner = ?record.header.lock_owner.map(LockId::get),
                "Commit skipped, lock not held"
            );
            return Ok(CommitOutcome::LockLost);
        }
        let Some(data_version) = record.data_version else {
            return Ok(CommitOutcome::LockLost);
        };

        let payload = encode_data(items)?;
        let ttl = header.ttl();

        if !self
            .client
            .compare_and_swap(&keys.data, &payload, ttl, data_version)
            .await?
        {
            warn!(session_id = %session_id, lock_id = %lock_id, "Session data changed under lock, commit aborted");
            return Ok(CommitOutcome::Conflict);
        }

        let written = self
            .rewrite_owned_header(
                session_id,
                &keys,
                lock_id,
                Some((record.header, record.header_version)),
                |_| header.clone(),
            )
            .await?;

        if written {
            debug!(session_id = %session_id, lock_id = %lock_id, items = items.len(), "Committed session");
            Ok(CommitOutcome::Committed)
        } else {
            warn!(session_id = %session_id, lock_id = %lock_id, "Lock lost after data write");
            Ok(CommitOutcome::LockLost)
        }
    }

    /// Delete a session locked under `lock_id`.
    ///
    /// Data goes first; a failure deleting it is logged and the header is
    /// still removed. Returns `false` when the lock isn't held.
    pub async fn remove_if_owned(&self, session_id: &str, lock_id: LockId) -> Result<bool> {
        let keys = self.keys.derive(session_id);

        let Some((header, _)) = self.read_header(session_id, &keys).await? else {
            return Ok(false);
        };
        if header.lock_owner != Some(lock_id) {
            debug!(session_id = %session_id, lock_id = %lock_id, "Remove ignored, lock not held");
            return Ok(false);
        }

        if let Err(e) = self.client.remove(&keys.data).await {
            warn!(session_id = %session_id, error = %e, "Failed to remove session data");
        }
        self.client.remove(&keys.header).await?;

        debug!(session_id = %session_id, lock_id = %lock_id, "Removed session");
        Ok(true)
    }

    /// Refresh the expiry of both entries without touching the lock.
    ///
    /// Rewrites data then header with their current contents and CAS. A lost
    /// race means another writer refreshed the entries and is not retried.
    /// Returns whether the header was rewritten.
    pub async fn reset_timeout(&self, session_id: &str) -> Result<bool> {
        let keys = self.keys.derive(session_id);

        let Some(record) = self.load(session_id, false).await? else {
            return Ok(false);
        };
        let Some(data_version) = record.data_version else {
            return Ok(false);
        };
        let ttl = record.header.ttl();

        if !self
            .client
            .compare_and_swap(&keys.data, &encode_data(&record.items)?, ttl, data_version)
            .await?
        {
            debug!(session_id = %session_id, "Session data changed during timeout reset");
            return Ok(false);
        }

        let refreshed = self
            .client
            .compare_and_swap(
                &keys.header,
                &encode_header(&record.header),
                ttl,
                record.header_version,
            )
            .await?;

        if refreshed {
            trace!(session_id = %session_id, timeout_minutes = record.header.timeout_minutes, "Reset session timeout");
        } else {
            debug!(session_id = %session_id, "Session header changed during timeout reset");
        }
        Ok(refreshed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Write data then header with plain `Set`, same TTL on both.
    async fn write_unconditionally(
        &self,
        keys: &SessionKeys,
        header: &SessionHeader,
        items: &SessionItems,
    ) -> Result<()> {
        let ttl = header.ttl();
        let payload = encode_data(items)?;
        self.client
            .store(StoreMode::Set, &keys.data, &payload, ttl)
            .await?;
        self.client
            .store(StoreMode::Set, &keys.header, &encode_header(header), ttl)
            .await?;
        Ok(())
    }

    /// CAS-rewrite the header while `lock_id` still owns it.
    ///
    /// `current` seeds the first attempt with an already-read header; later
    /// attempts reload. Each attempt re-checks ownership, so a lost race
    /// against a takeover ends with `false` rather than clobbering it.
    async fn rewrite_owned_header<F>(
        &self,
        session_id: &str,
        keys: &SessionKeys,
        lock_id: LockId,
        mut current: Option<(SessionHeader, u64)>,
        rewrite: F,
    ) -> Result<bool>
    where
        F: Fn(&SessionHeader) -> SessionHeader,
    {
        for attempt in 1..=self.retry.max_attempts {
            let (header, version) = match current.take() {
                Some(read) => read,
                None => match self.read_header(session_id, keys).await? {
                    Some(read) => read,
                    None => return Ok(false),
                },
            };

            if header.lock_owner != Some(lock_id) {
                return Ok(false);
            }

            let next = rewrite(&header);
            if self
                .client
                .compare_and_swap(&keys.header, &encode_header(&next), next.ttl(), version)
                .await?
            {
                return Ok(true);
            }

            let backoff = self.retry.backoff_for(attempt);
            debug!(session_id = %session_id, lock_id = %lock_id, attempt, "Header changed under lock holder, retrying");
            tokio::time::sleep(backoff).await;
        }

        warn!(session_id = %session_id, lock_id = %lock_id, "Gave up rewriting session header");
        Ok(false)
    }
}
