//! Database models mapping to the metadata schema.

use darkroom_core::DerivativeKey;
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// One cached derivative.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ImageRow {
    /// Lowercase hex SHA-256 of the origin URL.
    pub url_hash: String,
    pub variant: String,
    pub original_url: String,
    pub object_key: String,
    pub size_bytes: i64,
    pub created_at: OffsetDateTime,
    pub last_accessed_at: OffsetDateTime,
}

impl ImageRow {
    /// A fresh record for `key`, created and accessed at `now`.
    pub fn new(key: &DerivativeKey, original_url: &str, size_bytes: u64, now: OffsetDateTime) -> Self {
        Self {
            url_hash: key.hash.to_hex(),
            variant: key.variant.to_string(),
            original_url: original_url.to_string(),
            object_key: key.storage_key(),
            size_bytes: i64::try_from(size_bytes).unwrap_or(i64::MAX),
            created_at: now,
            last_accessed_at: now,
        }
    }
}

/// Aggregate for one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct VariantStats {
    pub variant: String,
    pub count: i64,
    pub total_bytes: i64,
}

/// Cache-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Only variants with at least one record, ordered by name.
    pub variants: Vec<VariantStats>,
    pub total_images: u64,
}

impl CacheStats {
    pub fn from_variants(variants: Vec<VariantStats>) -> Self {
        let total_images = variants.iter().map(|v| v.count.max(0) as u64).sum();
        Self {
            variants,
            total_images,
        }
    }

    /// Stats for one variant, if any records exist.
    pub fn variant(&self, name: &str) -> Option<&VariantStats> {
        self.variants.iter().find(|v| v.variant == name)
    }
}
