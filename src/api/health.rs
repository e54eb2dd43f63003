//! Health check endpoint
//!
//! `/health` answers `{status, version}`; the remote adapter probes it to
//! decide whether the service is reachable.

use axum::response::Json;
use axum::routing::get;
use axum::Router;
use labelsync_core::remote::wire::HealthResponse;

/// Simple health check (for load balancers and sync clients)
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create health routes
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_check))
}
