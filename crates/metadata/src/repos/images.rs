//! Image bookkeeping repository.

use crate::error::MetadataResult;
use crate::models::{CacheStats, ImageRow};
use async_trait::async_trait;
use darkroom_core::{UrlHash, Variant};
use time::OffsetDateTime;

/// Repository for per-derivative image records.
///
/// Records are advisory: the object store decides whether something is
/// cached, these rows only feed statistics.
#[async_trait]
pub trait ImageRepo: Send + Sync {
    /// Insert a record, or on `(url_hash, variant)` conflict refresh
    /// `last_accessed_at` only.
    async fn upsert_image(&self, image: &ImageRow) -> MetadataResult<()>;

    /// Set `last_accessed_at` for an existing record. Missing records are ignored.
    async fn touch_image(
        &self,
        url_hash: &UrlHash,
        variant: Variant,
        accessed_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Get one record.
    async fn get_image(
        &self,
        url_hash: &UrlHash,
        variant: Variant,
    ) -> MetadataResult<Option<ImageRow>>;

    /// Per-variant counts and byte totals.
    async fn get_stats(&self) -> MetadataResult<CacheStats>;
}
