//! Health endpoint.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Upper bound for each dependency check.
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Health of one dependency.
#[derive(Debug, Serialize)]
pub struct DependencyHealth {
    pub status: &'static str,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DependencyHealth {
    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub service: &'static str,
    pub version: &'static str,
    pub storage: DependencyHealth,
    pub metadata: DependencyHealth,
}

async fn check<E: Display>(
    backend: &'static str,
    probe: impl Future<Output = Result<(), E>>,
) -> DependencyHealth {
    let error = match tokio::time::timeout(CHECK_TIMEOUT, probe).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(format!("timed out after {}s", CHECK_TIMEOUT.as_secs())),
    };
    DependencyHealth {
        status: if error.is_none() { "ok" } else { "error" },
        backend,
        error,
    }
}

/// GET /api/health
///
/// Unauthenticated so load balancers and orchestrators can probe it.
/// Responds 503 when any dependency is unhealthy.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (storage, metadata) = tokio::join!(
        check(state.storage.backend_name(), state.storage.health_check()),
        check("metadata", state.metadata.health_check()),
    );

    let healthy = storage.is_ok() && metadata.is_ok();
    if !healthy {
        tracing::warn!(
            storage_error = ?storage.error,
            metadata_error = ?metadata.error,
            "Health check degraded"
        );
    }

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        timestamp: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        storage,
        metadata,
    };
    (status, Json(body))
}
