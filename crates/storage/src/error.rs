//! Storage error types.

use thiserror::Error;

/// Object store failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object under the key. Callers treat this as a cache miss.
    #[error("no object at {0}")]
    NotFound(String),

    #[error("filesystem: {0}")]
    Io(#[from] std::io::Error),

    #[error("s3 request failed: {0}")]
    S3(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// Key is empty, absolute, or resolves outside the storage root.
    #[error("rejected key {0:?}")]
    InvalidKey(String),

    #[error("storage misconfigured: {0}")]
    Config(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
