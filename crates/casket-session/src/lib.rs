//! CAS-locked session records over a shared key/value cache.
//!
//! This crate provides:
//! - [`KeyDeriver`] mapping session ids to namespaced header/data keys
//! - A fixed-layout binary codec for headers and item collections
//! - [`SessionStore`], the advisory locking protocol (load, acquire, release,
//!   commit, remove, timeout reset)
//! - [`SessionStateProvider`], the per-request surface a web framework drives
//!
//! # Example
//!
//! ```rust,ignore
//! use casket_kv::{connect, KvBackend};
//! use casket_session::{AcquireOutcome, SessionStore, StoreConfig};
//!
//! let store = SessionStore::new(connect(&KvBackend::Memory)?, StoreConfig::new("my-site"));
//! store.create_uninitialized("s1", 20).await?;
//!
//! if let AcquireOutcome::Acquired { mut record, lock_id, .. } =
//!     store.try_acquire_exclusive("s1").await?
//! {
//!     record.items.set_i64("A", 1);
//!     store.commit_and_release("s1", Some(lock_id), &record.items, 20, false).await?;
//! }
//! ```

pub mod codec;
mod config;
mod error;
mod items;
mod keys;
mod provider;
mod record;
mod store;
mod ttl;

pub use codec::CodecError;
pub use config::{LockRetryPolicy, StoreConfig};
pub use error::{Result, SessionError};
pub use items::{SessionItem, SessionItems, TypeTag};
pub use keys::{KeyDeriver, SessionKeys};
pub use provider::{ExclusiveItem, SessionStateProvider};
pub use record::{LockId, SessionAction, SessionHeader, SessionRecord};
pub use store::{AcquireOutcome, CommitOutcome, SessionStore};
pub use ttl::{MAX_TIMEOUT_MINUTES, lock_age, ttl_for};
