//! Storage-specific error types for the local block store.

use perfledger_core::errors::Error;
use thiserror::Error;

/// Errors raised while reading or writing the block directory tree.
///
/// These are internal to the storage layer and are converted to
/// `perfledger_core::Error` before being returned to callers.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid path component '{0}'")]
    InvalidPath(String),

    #[error("Block index lock poisoned")]
    LockPoisoned,
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidPath(component) => {
                Error::Repository(format!("invalid path component '{}'", component))
            }
            other => Error::Repository(other.to_string()),
        }
    }
}
