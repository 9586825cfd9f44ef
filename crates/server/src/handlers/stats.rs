//! Cache statistics endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use darkroom_metadata::CacheStats;
use serde::Serialize;
use std::collections::BTreeMap;

/// Cache statistics response.
#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    /// Stored derivatives per variant.
    pub image_counts: BTreeMap<String, i64>,
    /// Stored bytes per variant.
    pub image_sizes_bytes: BTreeMap<String, i64>,
    pub total_images: u64,
}

impl From<CacheStats> for CacheStatsResponse {
    fn from(stats: CacheStats) -> Self {
        let mut image_counts = BTreeMap::new();
        let mut image_sizes_bytes = BTreeMap::new();
        for variant in stats.variants {
            image_counts.insert(variant.variant.clone(), variant.count);
            image_sizes_bytes.insert(variant.variant, variant.total_bytes);
        }
        Self {
            image_counts,
            image_sizes_bytes,
            total_images: stats.total_images,
        }
    }
}

/// GET /api/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> ApiResult<Json<CacheStatsResponse>> {
    let stats = state.metadata.get_stats().await?;
    Ok(Json(stats.into()))
}
