//! Health check endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - Liveness probe (is the service running?)
//! - /ready, /readyz - Readiness probe (does the store answer?)
//!
//! None of these pass through admission.

use hyper::{Response, StatusCode};
use serde::Serialize;

use super::{json_response, FullBody};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Seconds since startup
    pub uptime: u64,
    pub timestamp: String,
    pub environment: &'static str,
    pub node_id: String,
    /// "mongodb" or "memory"
    pub store: &'static str,
    pub schemes: usize,
    /// Live admission windows
    pub admission_windows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn build_health_response(state: &AppState, error: Option<String>) -> HealthResponse {
    HealthResponse {
        healthy: error.is_none(),
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        environment: if state.args.is_development() {
            "development"
        } else {
            "production"
        },
        node_id: state.args.node_id.to_string(),
        store: state.stores.backend_name(),
        schemes: state.catalog.len(),
        admission_windows: state.admission.windows().len(),
        error,
    }
}

/// Handle liveness probe (/health, /healthz); always 200 while running
pub fn health_check(state: &AppState) -> Response<FullBody> {
    json_response(StatusCode::OK, &build_health_response(state, None))
}

/// Handle readiness probe (/ready, /readyz); 503 when the store is unreachable
pub async fn readiness_check(state: &AppState) -> Response<FullBody> {
    match state.stores.ping().await {
        Ok(()) => json_response(StatusCode::OK, &build_health_response(state, None)),
        Err(e) => json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &build_health_response(state, Some(e.to_string())),
        ),
    }
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<FullBody> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "krishi-sakhi",
    };
    json_response(StatusCode::OK, &response)
}
