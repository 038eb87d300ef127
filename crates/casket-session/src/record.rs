//! Session record types.

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};

use crate::items::SessionItems;
use crate::ttl;

/// Identifies the holder of a session's exclusive lock.
///
/// Derived from the header's CAS version at acquisition time, so every
/// acquisition gets a token no earlier acquisition has used. Zero on the wire
/// means "unlocked" and has no `LockId` representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockId(NonZeroU64);

impl LockId {
    /// Wrap a raw token; `None` for zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// The raw token value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LockId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u64 = s
            .parse()
            .map_err(|e| format!("invalid lock id '{s}': {e}"))?;
        Self::new(raw).ok_or_else(|| "lock id must be nonzero".to_string())
    }
}

/// Pending action recorded on a session, handed back to the caller on
/// acquisition and otherwise passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionAction {
    /// Nothing pending.
    #[default]
    None,
    /// The session was created empty and the caller should initialize it.
    InitializeItem,
    /// Any other framework-defined value (never 0 or 1).
    Other(u8),
}

impl SessionAction {
    /// Decode from the wire byte.
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => Self::None,
            1 => Self::InitializeItem,
            other => Self::Other(other),
        }
    }

    /// Encode to the wire byte.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::InitializeItem => 1,
            Self::Other(b) => b,
        }
    }
}

/// Lock and metadata state stored in the header sub-record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHeader {
    /// Pending action.
    pub flag: SessionAction,
    /// Session timeout; also the TTL of both sub-records.
    pub timeout_minutes: u32,
    /// Current lock holder, `None` when unlocked.
    pub lock_owner: Option<LockId>,
    /// When the lock was taken. The Unix epoch while unlocked.
    pub lock_timestamp: DateTime<Utc>,
}

impl SessionHeader {
    /// Unlocked header with no pending action.
    pub fn unlocked(timeout_minutes: u32) -> Self {
        Self {
            flag: SessionAction::None,
            timeout_minutes,
            lock_owner: None,
            lock_timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Unlocked header for a session that still needs initializing.
    pub fn uninitialized(timeout_minutes: u32) -> Self {
        Self {
            flag: SessionAction::InitializeItem,
            ..Self::unlocked(timeout_minutes)
        }
    }

    /// Whether some caller holds the lock.
    pub fn is_locked(&self) -> bool {
        self.lock_owner.is_some()
    }

    /// Time since the lock was taken, as of `now`.
    pub fn lock_age(&self, now: DateTime<Utc>) -> Duration {
        ttl::lock_age(self.lock_timestamp, now)
    }

    /// Record `lock_id` as the holder, locked at `at`.
    ///
    /// The timestamp is truncated to whole microseconds, the precision the
    /// header is stored with, so the header compares equal after a write and
    /// read back.
    pub fn lock(&mut self, lock_id: LockId, at: DateTime<Utc>) {
        self.lock_owner = Some(lock_id);
        self.lock_timestamp = at.trunc_subsecs(6);
    }

    /// Clear the lock.
    pub fn release(&mut self) {
        self.lock_owner = None;
        self.lock_timestamp = DateTime::<Utc>::UNIX_EPOCH;
    }

    /// TTL for sub-records written with this header.
    pub fn ttl(&self) -> Duration {
        ttl::ttl_for(self.timeout_minutes)
    }
}

/// A session as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    /// Caller-supplied session identifier.
    pub session_id: String,
    /// Lock and metadata state.
    pub header: SessionHeader,
    /// Session items. Empty for header-only loads.
    pub items: SessionItems,
    /// CAS version of the header when it was read.
    pub header_version: u64,
    /// CAS version of the data when it was read; `None` for header-only loads.
    pub data_version: Option<u64>,
}

impl SessionRecord {
    /// Time since the lock was taken, measured now.
    pub fn lock_age(&self) -> Duration {
        self.header.lock_age(Utc::now())
    }
}
