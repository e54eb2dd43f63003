//! Web API module for the session service
//!
//! Provides REST API endpoints for:
//! - Session snapshots (save, replicate, fetch, delete, list)
//! - The active session pointer
//! - Health checks

pub mod health;
pub mod sessions;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;

pub use health::health_routes;
pub use sessions::{sessions_routes, SessionService};

/// Create the API router with all endpoints
pub fn api_router(service: SessionService) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(sessions_routes(service))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

/// Error response: a status code plus `{success: false, error}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<labelsync_core::Error> for ApiError {
    fn from(err: labelsync_core::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
