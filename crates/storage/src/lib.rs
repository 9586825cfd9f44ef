//! Object storage abstraction and backends for darkroom.
//!
//! This crate provides:
//! - The `ObjectStore` trait used by the image cache
//! - Backends: local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{
    filesystem::FilesystemBackend,
    s3::{S3Backend, S3Settings},
};
pub use error::{StorageError, StorageResult};
pub use traits::{ObjectMeta, ObjectStore};

use darkroom_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
///
/// For S3 with `create_bucket` set, the bucket is created here if missing.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
            create_bucket,
        } => {
            let backend = S3Backend::new(S3Settings {
                bucket: bucket.clone(),
                endpoint: endpoint.clone(),
                region: region.clone(),
                prefix: prefix.clone(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                force_path_style: *force_path_style,
            })
            .await?;
            if *create_bucket {
                backend.ensure_bucket().await?;
            }
            Ok(Arc::new(backend))
        }
    }
}
