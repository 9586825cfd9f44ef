//! Derivative cache coordinator.
//!
//! Resolves `(origin URL, variant)` to image bytes. Hits are served straight
//! from object storage without locking. Misses are filled under a per-URL
//! lock, so a source image is fetched from its origin at most once however
//! many variants are requested concurrently. Origin fetches across all URLs
//! share a bounded download gate.
//!
//! Once a caller holds the lock, the fill runs in its own task. A caller that
//! gives up (deadline or disconnect) leaves the fill running, and the result
//! lands in the cache for whoever asks next.

pub mod fetch;
pub mod locks;
pub mod transform;

pub use fetch::{FetchError, HttpFetcher, OriginFetcher};
pub use locks::{LockTable, ResourceGuard};
pub use transform::{TransformError, content_type_for, transform};

use crate::metrics;
use bytes::Bytes;
use darkroom_core::config::ImageConfig;
use darkroom_core::{DerivativeKey, Variant, VariantSpec};
use darkroom_metadata::{ImageRow, MetadataStore};
use darkroom_storage::{ObjectStore, StorageError};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::time::{Instant, timeout_at};

/// Resolution failure.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid variant: {0}")]
    InvalidVariant(String),

    #[error(transparent)]
    OriginFetch(#[from] FetchError),

    #[error("failed to store {key}: {source}")]
    StorageWrite { key: String, source: StorageError },

    #[error("failed to read {key}: {source}")]
    StorageRead { key: String, source: StorageError },

    #[error("deadline exceeded")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CacheError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidVariant(_) => "invalid_variant",
            Self::OriginFetch(_) => "origin_fetch_failed",
            Self::StorageWrite { .. } => "storage_write_failed",
            Self::StorageRead { .. } => "storage_read_failed",
            Self::Timeout => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Shared handle to the derivative cache.
#[derive(Clone)]
pub struct ImageCache {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    fetcher: Arc<dyn OriginFetcher>,
    variants: VariantSpec,
    jpeg_quality: u8,
    locks: Arc<LockTable>,
    gate: Arc<Semaphore>,
}

impl ImageCache {
    pub fn new(
        config: &ImageConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        fetcher: Arc<dyn OriginFetcher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                metadata,
                fetcher,
                variants: config.variant_spec(),
                jpeg_quality: config.jpeg_quality,
                locks: Arc::new(LockTable::new()),
                gate: Arc::new(Semaphore::new(config.max_concurrent_downloads)),
            }),
        }
    }

    /// Configured variants.
    pub fn variants(&self) -> &VariantSpec {
        &self.inner.variants
    }

    /// Resources currently locked or awaited.
    pub fn lock_table_len(&self) -> usize {
        self.inner.locks.len()
    }

    /// Resolve `url` at `variant`, giving up at `deadline`.
    ///
    /// An unknown or unconfigured variant fails before any I/O.
    pub async fn resolve(&self, url: &str, variant: &str, deadline: Instant) -> CacheResult<Bytes> {
        let variant = self
            .inner
            .variants
            .parse(variant)
            .map_err(|_| CacheError::InvalidVariant(variant.to_string()))?;

        let started = std::time::Instant::now();
        let result = self.resolve_variant(url, variant, deadline).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        metrics::RESOLVE_DURATION
            .with_label_values(&[outcome])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    async fn resolve_variant(
        &self,
        url: &str,
        variant: Variant,
        deadline: Instant,
    ) -> CacheResult<Bytes> {
        let key = DerivativeKey::for_url(url, variant);

        if let Some(bytes) = self.inner.cached(&key).await? {
            metrics::CACHE_HITS
                .with_label_values(&[variant.as_str()])
                .inc();
            return Ok(bytes);
        }

        let guard = timeout_at(deadline, self.inner.locks.lock(key.hash))
            .await
            .map_err(|_| {
                tracing::debug!(url_hash = %key.hash, variant = %variant, "Gave up waiting for resource lock");
                CacheError::Timeout
            })?;
        metrics::LOCK_TABLE_ENTRIES.set(self.inner.locks.len() as i64);

        let inner = self.inner.clone();
        let url = url.to_string();
        let worker = tokio::spawn(async move {
            let result = inner.fill(&url, key, deadline).await;
            drop(guard);
            metrics::LOCK_TABLE_ENTRIES.set(inner.locks.len() as i64);
            result
        });

        match timeout_at(deadline, worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(CacheError::Internal(format!("resolve worker failed: {e}"))),
            Err(_) => {
                tracing::debug!(url_hash = %key.hash, variant = %variant, "Caller deadline passed, fill continues in background");
                Err(CacheError::Timeout)
            }
        }
    }
}

impl Inner {
    /// Stored bytes for `key`, refreshing its access time. `None` on a miss.
    async fn cached(&self, key: &DerivativeKey) -> CacheResult<Option<Bytes>> {
        let storage_key = key.storage_key();
        match self.storage.exists(&storage_key).await {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "Existence check failed, treating as miss");
                return Ok(None);
            }
        }

        let bytes = match self.storage.get(&storage_key).await {
            Ok(bytes) => bytes,
            // Deleted between the check and the read.
            Err(e) if e.is_not_found() => return Ok(None),
            Err(source) => {
                return Err(CacheError::StorageRead {
                    key: storage_key,
                    source,
                });
            }
        };

        self.touch(key).await;
        Ok(Some(bytes))
    }

    /// Produce and store `key`. Runs with the resource lock held.
    async fn fill(&self, url: &str, key: DerivativeKey, deadline: Instant) -> CacheResult<Bytes> {
        // Another holder may have produced it while we waited.
        if let Some(bytes) = self.cached(&key).await? {
            metrics::CACHE_HITS
                .with_label_values(&[key.variant.as_str()])
                .inc();
            return Ok(bytes);
        }
        metrics::CACHE_MISSES
            .with_label_values(&[key.variant.as_str()])
            .inc();

        let original = key.original();
        let stored = if key.variant == Variant::Original {
            None
        } else {
            self.stored_original(&original).await
        };

        let (raw, permit) = match stored {
            Some(raw) => {
                tracing::debug!(url_hash = %key.hash, variant = %key.variant, "Deriving from stored original");
                (raw, None)
            }
            None => {
                let permit = match timeout_at(deadline, self.gate.clone().acquire_owned()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => {
                        return Err(CacheError::Internal("download gate closed".to_string()));
                    }
                    Err(_) => return Err(CacheError::Timeout),
                };
                let raw = self.fetch_origin(url, &key, deadline).await?;
                if key.variant != Variant::Original {
                    self.store_original(url, &original, &raw).await;
                }
                (raw, Some(permit))
            }
        };

        let output = self.derive(&key, raw).await;
        let storage_key = key.storage_key();
        self.storage
            .put(&storage_key, output.clone(), content_type_for(&output))
            .await
            .map_err(|source| {
                tracing::error!(key = %storage_key, error = %source, "Failed to store derivative");
                CacheError::StorageWrite {
                    key: storage_key.clone(),
                    source,
                }
            })?;
        metrics::BYTES_STORED
            .with_label_values(&[key.variant.as_str()])
            .inc_by(output.len() as u64);
        self.record(url, &key, output.len()).await;

        drop(permit);
        tracing::info!(
            url_hash = %key.hash,
            variant = %key.variant,
            bytes = output.len(),
            "Stored derivative"
        );
        Ok(output)
    }

    async fn fetch_origin(
        &self,
        url: &str,
        key: &DerivativeKey,
        deadline: Instant,
    ) -> CacheResult<Bytes> {
        metrics::ORIGIN_FETCHES.inc();
        metrics::ORIGIN_FETCHES_IN_FLIGHT.inc();
        let result = self.fetcher.fetch(url, deadline).await;
        metrics::ORIGIN_FETCHES_IN_FLIGHT.dec();

        result.map_err(|e| {
            metrics::ORIGIN_FETCH_FAILURES
                .with_label_values(&[e.cause()])
                .inc();
            tracing::warn!(url_hash = %key.hash, error = %e, "Origin fetch failed");
            CacheError::OriginFetch(e)
        })
    }

    /// Source bytes kept by an earlier fill, if readable.
    async fn stored_original(&self, original: &DerivativeKey) -> Option<Bytes> {
        let storage_key = original.storage_key();
        match self.storage.exists(&storage_key).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "Existence check for original failed");
                return None;
            }
        }
        match self.storage.get(&storage_key).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "Stored original unreadable, refetching");
                None
            }
        }
    }

    /// Keep the untouched source next to the derivative. Best effort.
    async fn store_original(&self, url: &str, original: &DerivativeKey, raw: &Bytes) {
        let storage_key = original.storage_key();
        if let Err(e) = self
            .storage
            .put(&storage_key, raw.clone(), content_type_for(raw))
            .await
        {
            tracing::warn!(key = %storage_key, error = %e, "Failed to store original, continuing");
            metrics::record_bookkeeping_failure("store_original");
            return;
        }
        metrics::BYTES_STORED
            .with_label_values(&[Variant::Original.as_str()])
            .inc_by(raw.len() as u64);
        self.record(url, original, raw.len()).await;
    }

    /// Bytes to store for `key`. Falls back to `raw` when transforming fails.
    async fn derive(&self, key: &DerivativeKey, raw: Bytes) -> Bytes {
        if self.variants.is_passthrough(key.variant) {
            return raw;
        }
        let Some(width) = self.variants.width(key.variant) else {
            return raw;
        };

        let source = raw.clone();
        let quality = self.jpeg_quality;
        let transformed =
            tokio::task::spawn_blocking(move || transform(&source, width, quality)).await;

        let error = match transformed {
            Ok(Ok(bytes)) => return bytes,
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("transform task failed: {e}"),
        };
        tracing::warn!(
            url_hash = %key.hash,
            variant = %key.variant,
            error = %error,
            "Transform failed, storing original bytes"
        );
        metrics::TRANSFORM_FALLBACKS.inc();
        raw
    }

    async fn record(&self, url: &str, key: &DerivativeKey, size: usize) {
        let row = ImageRow::new(key, url, size as u64, OffsetDateTime::now_utc());
        if let Err(e) = self.metadata.upsert_image(&row).await {
            tracing::warn!(key = %row.object_key, error = %e, "Failed to record image metadata");
            metrics::record_bookkeeping_failure("upsert_image");
        }
    }

    async fn touch(&self, key: &DerivativeKey) {
        if let Err(e) = self
            .metadata
            .touch_image(&key.hash, key.variant, OffsetDateTime::now_utc())
            .await
        {
            tracing::warn!(url_hash = %key.hash, variant = %key.variant, error = %e, "Failed to update access time");
            metrics::record_bookkeeping_failure("touch_image");
        }
    }
}
