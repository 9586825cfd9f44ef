//! Image cache test utilities.

use super::metadata::TestMetadata;
use super::mocks::MockFetcher;
use super::storage::TestStorage;
use darkroom_core::config::ImageConfig;
use darkroom_metadata::MetadataStore;
use darkroom_server::ImageCache;
use darkroom_storage::ObjectStore;
use std::sync::Arc;

/// An image cache over temporary stores and a scripted origin.
#[allow(dead_code)]
pub struct TestCache {
    pub cache: ImageCache,
    pub fetcher: Arc<MockFetcher>,
    pub storage: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataStore>,
    _storage: TestStorage,
    _metadata: TestMetadata,
}

#[allow(dead_code)]
impl TestCache {
    /// Default variants, no origin latency.
    pub async fn new() -> Self {
        Self::build(ImageConfig::default(), MockFetcher::new()).await
    }

    pub async fn build(config: ImageConfig, fetcher: MockFetcher) -> Self {
        let test_storage = TestStorage::new()
            .await
            .expect("Failed to create test storage");
        let test_metadata = TestMetadata::new()
            .await
            .expect("Failed to create test metadata");
        let storage = test_storage.store();
        let metadata = test_metadata.store();
        let fetcher = Arc::new(fetcher);

        let cache = ImageCache::new(&config, storage.clone(), metadata.clone(), fetcher.clone());
        Self {
            cache,
            fetcher,
            storage,
            metadata,
            _storage: test_storage,
            _metadata: test_metadata,
        }
    }

    /// Same temporary stores, wrapped by the caller (e.g. to inject failures).
    pub fn cache_with(
        &self,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> ImageCache {
        ImageCache::new(
            &ImageConfig::default(),
            storage,
            metadata,
            self.fetcher.clone(),
        )
    }
}
