//! Error types for key/value client operations.

/// Errors raised by a key/value backend.
///
/// Version mismatches on compare-and-swap are not errors; they are reported
/// through the `bool` result of [`crate::KvClient::compare_and_swap`].
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// SQLite operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Key is empty, too long, or contains whitespace/control characters.
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// A blocking database task panicked or was cancelled.
    #[error("Blocking task failed: {0}")]
    Task(String),

    /// Failed to prepare the backing storage location.
    #[error("Storage path '{path}' unavailable: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Result type for key/value client operations.
pub type Result<T> = std::result::Result<T, KvError>;
