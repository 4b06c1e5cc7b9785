//! Health and version endpoints
//!
//! - `/api/canvas/health` reports liveness plus store and listener counts
//! - `/version` reports build information for deployment checks

use hyper::{Response, StatusCode};
use serde::Serialize;

use super::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    /// Stored canvases
    pub canvases: usize,
    /// Live WebSocket listeners across all canvases
    pub listeners: usize,
    /// Canvases with at least one listener
    pub active_canvases: usize,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        canvases: state.store.len(),
        listeners: state.hub.connection_count(),
        active_canvases: state.hub.tracked_count(),
    }
}

/// Liveness probe; always 200 while the process serves requests
pub fn health_check(state: &AppState) -> Response<BoxBody> {
    json_response(StatusCode::OK, &build_health_response(state))
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    /// Cargo package version
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Git commit hash (full)
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

pub fn version_info() -> Response<BoxBody> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "atelier",
    };
    json_response(StatusCode::OK, &response)
}
