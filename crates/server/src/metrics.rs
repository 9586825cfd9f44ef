//! Prometheus metrics for the darkroom server.
//!
//! Covers cache hit rates, origin traffic, transform fallbacks and the
//! resolve latency seen by callers. Label values are variant names and
//! outcome codes only; origin URLs never appear in metrics.
//!
//! The `/metrics` endpoint is unauthenticated. Restrict it to scrapers at the
//! network level when the server is exposed publicly.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Cache lookups
pub static CACHE_HITS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "darkroom_cache_hits_total",
            "Resolutions served from storage without an origin fetch",
        ),
        &["variant"],
    )
    .expect("metric creation failed")
});

pub static CACHE_MISSES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "darkroom_cache_misses_total",
            "Resolutions that produced a new derivative",
        ),
        &["variant"],
    )
    .expect("metric creation failed")
});

// Origin traffic
pub static ORIGIN_FETCHES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "darkroom_origin_fetches_total",
        "Total number of origin fetches started",
    )
    .expect("metric creation failed")
});

pub static ORIGIN_FETCH_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "darkroom_origin_fetch_failures_total",
            "Failed origin fetches by cause",
        ),
        &["cause"],
    )
    .expect("metric creation failed")
});

pub static ORIGIN_FETCHES_IN_FLIGHT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "darkroom_origin_fetches_in_flight",
        "Origin fetches currently holding a download slot",
    )
    .expect("metric creation failed")
});

// Processing
pub static TRANSFORM_FALLBACKS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "darkroom_transform_fallbacks_total",
        "Derivatives stored as the raw origin bytes because the transform failed",
    )
    .expect("metric creation failed")
});

pub static BYTES_STORED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("darkroom_bytes_stored_total", "Bytes written to object storage"),
        &["variant"],
    )
    .expect("metric creation failed")
});

pub static BOOKKEEPING_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "darkroom_bookkeeping_failures_total",
            "Best-effort writes that failed and were ignored",
        ),
        &["operation"],
    )
    .expect("metric creation failed")
});

// Latency
pub static RESOLVE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "darkroom_resolve_duration_seconds",
            "Time taken to resolve an image request",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static LOCK_TABLE_ENTRIES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "darkroom_lock_table_entries",
        "Resources currently held or awaited in the lock table",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests and embedded routers may call it freely.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(CACHE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_MISSES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ORIGIN_FETCHES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ORIGIN_FETCH_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ORIGIN_FETCHES_IN_FLIGHT.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TRANSFORM_FALLBACKS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_STORED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BOOKKEEPING_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RESOLVE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LOCK_TABLE_ENTRIES.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count a best-effort write that failed.
pub fn record_bookkeeping_failure(operation: &str) {
    BOOKKEEPING_FAILURES.with_label_values(&[operation]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_registered_metrics_are_gathered() {
        register_metrics();
        CACHE_HITS.with_label_values(&["thumbnail"]).inc();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("darkroom_cache_hits_total{variant=\"thumbnail\"}"));
    }
}
