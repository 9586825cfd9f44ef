//! Metadata store error types.

use thiserror::Error;

/// Bookkeeping failures. The cache logs these and carries on.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata store misconfigured: {0}")]
    Config(String),

    #[error("metadata store: {0}")]
    Internal(String),
}

pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
