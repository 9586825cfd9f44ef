//! Application state shared across handlers.

use crate::images::{ImageCache, OriginFetcher};
use darkroom_core::config::AppConfig;
use darkroom_metadata::MetadataStore;
use darkroom_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Derivative cache coordinator.
    pub images: ImageCache,
}

impl AppState {
    /// Wire the image cache to its collaborators.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        fetcher: Arc<dyn OriginFetcher>,
    ) -> Self {
        let images = ImageCache::new(&config.images, storage.clone(), metadata.clone(), fetcher);
        Self {
            config: Arc::new(config),
            storage,
            metadata,
            images,
        }
    }
}
