//! Image endpoints.

use crate::error::{ApiError, ApiResult};
use crate::images::content_type_for;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use std::collections::BTreeMap;
use tokio::time::Instant;

/// Characters left unescaped in a query value (RFC 3986 unreserved).
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Query string carrying the origin URL.
#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub url: Option<String>,
}

/// The origin URL from the query, if it is an absolute http(s) URL.
fn origin_url(query: &ImageQuery) -> ApiResult<&str> {
    let raw = query
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing url parameter".to_string()))?;

    let parsed = reqwest::Url::parse(raw)
        .map_err(|e| ApiError::BadRequest(format!("invalid url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw),
        other => Err(ApiError::BadRequest(format!(
            "unsupported url scheme: {other}"
        ))),
    }
}

/// GET /api/images/{variant}?url=...
pub async fn get_image(
    State(state): State<AppState>,
    Path(variant): Path<String>,
    Query(query): Query<ImageQuery>,
) -> ApiResult<Response> {
    let url = origin_url(&query)?;
    let deadline = Instant::now() + state.config.server.request_timeout();

    let bytes = state.images.resolve(url, &variant, deadline).await?;

    let cache_control = format!(
        "public, max-age={}",
        state.config.images.cache_max_age_secs
    );
    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type_for(&bytes).to_string()),
            (CACHE_CONTROL, cache_control),
            (CONTENT_LENGTH, bytes.len().to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// GET /api/images?url=...
///
/// Links to every configured variant of one origin image.
pub async fn get_image_urls(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ImageQuery>,
) -> ApiResult<Json<BTreeMap<String, String>>> {
    let url = origin_url(&query)?;
    let base = base_url(&headers)?;
    let encoded = utf8_percent_encode(url, QUERY_VALUE);

    let urls = state
        .images
        .variants()
        .variants()
        .map(|variant| {
            (
                variant.to_string(),
                format!("{base}/api/images/{variant}?url={encoded}"),
            )
        })
        .collect();
    Ok(Json(urls))
}

/// Public base URL from `Host` and `X-Forwarded-Proto`.
fn base_url(headers: &HeaderMap) -> ApiResult<String> {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing Host header".to_string()))?;

    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|p| matches!(*p, "http" | "https"))
        .unwrap_or("http");

    Ok(format!("{proto}://{host}"))
}
