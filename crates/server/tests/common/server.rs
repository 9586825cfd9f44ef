//! Server test utilities.

use super::mocks::MockFetcher;
use darkroom_core::config::{AppConfig, MetadataConfig, StorageConfig};
use darkroom_metadata::{MetadataStore, SqliteStore};
use darkroom_server::{AppState, create_router};
use darkroom_storage::{FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub fetcher: Arc<MockFetcher>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage and default config.
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    /// Create a test server; storage and metadata sections are replaced by
    /// temporary locations.
    pub async fn with_config(mut config: AppConfig) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        config.storage = StorageConfig::Filesystem { path: storage_path };
        config.metadata = MetadataConfig::Sqlite {
            path: db_path,
            query_timeout_secs: None,
        };

        let fetcher = Arc::new(MockFetcher::new());
        let state = AppState::new(config, storage, metadata, fetcher.clone());
        let router = create_router(state.clone());

        Self {
            router,
            state,
            fetcher,
            _temp_dir: temp_dir,
        }
    }

    /// Replace the metadata store, keeping everything else.
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataStore>) -> Self {
        let config = (*self.state.config).clone();
        self.state = AppState::new(
            config,
            self.state.storage.clone(),
            metadata,
            self.fetcher.clone(),
        );
        self.router = create_router(self.state.clone());
        self
    }
}
