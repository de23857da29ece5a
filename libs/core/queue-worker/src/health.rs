//! Health check handlers for the bridge worker.
//!
//! - Liveness probes (`/health`, `/healthz`)
//! - Readiness probes (`/ready`, `/readyz`): ready while the pool is running
//! - Prometheus metrics (`/metrics`)

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use core_config::AppInfo;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::metrics;
use crate::pool::PoolStatus;

/// Shared state for health endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Application name.
    pub app_name: String,
    /// Application version.
    pub app_version: String,
    /// Source queue, reported on readiness.
    pub queue_url: String,
    /// Pool status for readiness.
    pub pool: Arc<PoolStatus>,
}

impl HealthState {
    pub fn new(app_info: AppInfo, queue_url: impl Into<String>, pool: Arc<PoolStatus>) -> Self {
        Self {
            app_name: app_info.name,
            app_version: app_info.version,
            queue_url: queue_url.into(),
            pool,
        }
    }
}

/// Health response for liveness probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status (always "healthy" if responding).
    pub status: String,
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
}

/// Liveness probe handler.
///
/// Always returns OK if the server is running.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        name: state.app_name,
        version: state.app_version,
    })
}

/// Readiness probe handler.
///
/// 503 until the pool has started, and again once it stops.
pub async fn ready_handler(
    State(state): State<HealthState>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let body = |status: &str| {
        Json(json!({
            "status": status,
            "queue_url": state.queue_url,
            "checks": {
                "live_workers": state.pool.live_workers(),
                "cycles_completed": state.pool.cycles_completed(),
                "respawns": state.pool.respawns(),
            }
        }))
    };

    if state.pool.is_ready() {
        Ok((StatusCode::OK, body("ready")))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, body("not_ready")))
    }
}

/// Prometheus metrics endpoint handler.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Some(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            output,
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics disabled".to_string(),
        )
            .into_response(),
    }
}

/// Create the health router.
///
/// - `/health`, `/healthz` - Liveness probe
/// - `/ready`, `/readyz` - Readiness probe
/// - `/metrics` - Prometheus metrics
pub fn health_router(state: HealthState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
