//! Error types for session store operations.

use casket_kv::KvError;

use crate::codec::CodecError;

/// Error type for session store operations.
///
/// Lost locks, CAS conflicts and unreadable records are not errors; they are
/// reported through the outcome types of [`crate::SessionStore`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The key/value backend failed.
    #[error("KV error: {0}")]
    Kv(#[from] KvError),

    /// Session items could not be encoded.
    #[error("Encoding error: {0}")]
    Encode(#[from] CodecError),

    /// Timeout outside `1..=MAX_TIMEOUT_MINUTES`.
    #[error("Invalid session timeout: {0} minutes")]
    InvalidTimeout(u32),

    /// The backend returned a zero CAS version, which can't serve as a lock id.
    #[error("Backend returned a zero CAS version for '{0}'")]
    ZeroVersion(String),
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, SessionError>;
