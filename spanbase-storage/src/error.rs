//! Error taxonomy shared by every storage backend.

use thiserror::Error;

/// A specialized `Result` for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced through the storage contracts.
///
/// Callers match on the variant, never on the message; the messages are
/// nevertheless stable because remote clients grep for them.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested trace does not exist. Not a failure; never logged at
    /// error level.
    #[error("trace not found")]
    TraceNotFound,

    /// The query was malformed. Returned to the caller unmodified.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The backend is temporarily unavailable. Safe to retry with backoff.
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// Schema mismatch, corrupted record, or another fatal backend
    /// condition. The operation fails; the process keeps running.
    #[error("internal storage failure: {0}")]
    Internal(String),

    /// The capability is absent on this backend. Callers degrade instead
    /// of failing.
    #[error("not supported by this backend: {0}")]
    Unsupported(&'static str),

    /// The backend does not provide an archive namespace.
    #[error("archive storage not supported")]
    ArchiveNotSupported,
}

impl StorageError {
    /// Whether the caller may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }

    /// Whether this is the benign not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::TraceNotFound)
    }
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(io) => StorageError::Transient(io.to_string()),
            other => StorageError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Internal(format!("record serialization failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_is_stable() {
        assert_eq!(StorageError::TraceNotFound.to_string(), "trace not found");
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(StorageError::Transient("down".into()).is_retryable());
        assert!(!StorageError::TraceNotFound.is_retryable());
        assert!(!StorageError::Internal("bad".into()).is_retryable());
    }
}
