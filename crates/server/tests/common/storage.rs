//! Storage test utilities.

use async_trait::async_trait;
use bytes::Bytes;
use darkroom_storage::{
    FilesystemBackend, ObjectMeta, ObjectStore, StorageError, StorageResult,
};
use std::sync::Arc;
use tempfile::TempDir;

/// A test storage wrapper that cleans up on drop.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestStorage {
    pub backend: Arc<dyn ObjectStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestStorage {
    /// Create a new test storage with a temporary directory.
    pub async fn new() -> StorageResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let backend = FilesystemBackend::new(temp_dir.path()).await?;

        Ok(Self {
            backend: Arc::new(backend),
            _temp_dir: temp_dir,
        })
    }

    /// Get a reference to the object store.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.backend.clone()
    }
}

/// Object store that rejects writes to keys under the given prefixes.
#[allow(dead_code)]
pub struct FailingStore {
    inner: Arc<dyn ObjectStore>,
    failing_prefixes: Vec<String>,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn new(inner: Arc<dyn ObjectStore>, failing_prefixes: &[&str]) -> Self {
        Self {
            inner,
            failing_prefixes: failing_prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        if self.failing_prefixes.iter().any(|p| key.starts_with(p.as_str())) {
            return Err(StorageError::Io(std::io::Error::other(format!(
                "injected write failure for {key}"
            ))));
        }
        self.inner.put(key, data, content_type).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
