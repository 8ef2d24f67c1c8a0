//! Storage layer error types
//!
//! Defines all errors that can occur in the storage gateway.

use thiserror::Error;

/// Errors that can occur in the storage gateway
#[derive(Error, Debug)]
pub enum StorageError {
    /// The host has no usable store (cannot open or create it)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A single read or write failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::TransactionFailed(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::StorageUnavailable("no such directory".to_string());
        assert_eq!(err.to_string(), "Storage unavailable: no such directory");

        let err = StorageError::TransactionFailed("disk full".to_string());
        assert_eq!(err.to_string(), "Transaction failed: disk full");
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let err: StorageError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, StorageError::TransactionFailed(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
