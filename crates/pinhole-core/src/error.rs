use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Error vocabulary shared by every storage engine.
///
/// `NotFound` and `Gone` are expected resolution outcomes; everything else
/// is a storage fault and maps to a 5xx-class response upstream.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// No record exists for the key or user.
    #[error("not found: {0}")]
    NotFound(String),
    /// A record exists for the key but carries a tombstone.
    #[error("gone: {0}")]
    Gone(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("storage I/O failed: {0}")]
    Io(String),
    #[error("migration failed: {0}")]
    Migration(String),
}

impl StorageError {
    /// Distinguishes infrastructure faults from the expected `NotFound`
    /// and `Gone` outcomes of a lookup.
    pub fn is_fault(&self) -> bool {
        !matches!(self, StorageError::NotFound(_) | StorageError::Gone(_))
    }
}
