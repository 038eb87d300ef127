//! Session-state provider surface.
//!
//! The seven operations a web framework's session module drives per request.
//! Each maps onto one [`SessionStore`] operation; the framework adapter only
//! translates types.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::items::SessionItems;
use crate::record::{LockId, SessionAction, SessionRecord};
use crate::store::{AcquireOutcome, CommitOutcome, SessionStore};

/// What [`SessionStateProvider::get_item_exclusive`] reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ExclusiveItem {
    /// The session, present only when the lock was acquired.
    pub record: Option<SessionRecord>,
    /// Whether someone else holds the lock (or acquisition gave up).
    pub locked: bool,
    /// Age of the other holder's lock; zero otherwise.
    pub lock_age: Duration,
    /// The caller's new lock id on success, the other holder's when locked.
    pub lock_id: Option<LockId>,
    /// Pending action the session carried; `None` unless acquired.
    pub actions: SessionAction,
}

impl ExclusiveItem {
    fn absent() -> Self {
        Self {
            record: None,
            locked: false,
            lock_age: Duration::ZERO,
            lock_id: None,
            actions: SessionAction::None,
        }
    }
}

impl From<AcquireOutcome> for ExclusiveItem {
    fn from(outcome: AcquireOutcome) -> Self {
        match outcome {
            AcquireOutcome::Acquired {
                record,
                lock_id,
                pending,
            } => Self {
                record: Some(record),
                lock_id: Some(lock_id),
                actions: pending,
                ..Self::absent()
            },
            AcquireOutcome::Contended { owner, age } => Self {
                locked: true,
                lock_age: age,
                lock_id: Some(owner),
                ..Self::absent()
            },
            AcquireOutcome::Exhausted { .. } => Self {
                locked: true,
                ..Self::absent()
            },
            AcquireOutcome::NotFound => Self::absent(),
        }
    }
}

/// Session-state operations backing a web framework's session module.
#[async_trait]
pub trait SessionStateProvider: Send + Sync {
    /// Store an empty session flagged for initialization.
    async fn create_uninitialized_item(&self, session_id: &str, timeout_minutes: u32)
    -> Result<()>;

    /// Read a session without locking it.
    async fn get_item(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Read a session and take its exclusive lock.
    async fn get_item_exclusive(&self, session_id: &str) -> Result<ExclusiveItem>;

    /// Release a lock without writing data. Returns whether it was held.
    async fn release_item_exclusive(&self, session_id: &str, lock_id: LockId) -> Result<bool>;

    /// Delete a locked session. Returns whether it was removed.
    async fn remove_item(&self, session_id: &str, lock_id: LockId) -> Result<bool>;

    /// Refresh a session's expiry.
    async fn reset_item_timeout(&self, session_id: &str) -> Result<bool>;

    /// Write items and release the lock.
    async fn set_and_release_item_exclusive(
        &self,
        session_id: &str,
        lock_id: Option<LockId>,
        items: &SessionItems,
        timeout_minutes: u32,
        is_new_item: bool,
    ) -> Result<CommitOutcome>;
}

#[async_trait]
impl SessionStateProvider for SessionStore {
    async fn create_uninitialized_item(
        &self,
        session_id: &str,
        timeout_minutes: u32,
    ) -> Result<()> {
        self.create_uninitialized(session_id, timeout_minutes).await
    }

    async fn get_item(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.load(session_id, false).await
    }

    async fn get_item_exclusive(&self, session_id: &str) -> Result<ExclusiveItem> {
        self.try_acquire_exclusive(session_id).await.map(Into::into)
    }

    async fn release_item_exclusive(&self, session_id: &str, lock_id: LockId) -> Result<bool> {
        self.release_exclusive(session_id, lock_id).await
    }

    async fn remove_item(&self, session_id: &str, lock_id: LockId) -> Result<bool> {
        self.remove_if_owned(session_id, lock_id).await
    }

    async fn reset_item_timeout(&self, session_id: &str) -> Result<bool> {
        self.reset_timeout(session_id).await
    }

    async fn set_and_release_item_exclusive(
        &self,
        session_id: &str,
        lock_id: Option<LockId>,
        items: &SessionItems,
        timeout_minutes: u32,
        is_new_item: bool,
    ) -> Result<CommitOutcome> {
        self.commit_and_release(session_id, lock_id, items, timeout_minutes, is_new_item)
            .await
    }
}
