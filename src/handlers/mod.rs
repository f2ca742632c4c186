pub mod cache_admin;
pub mod grpc;
pub mod rest;
pub mod websocket;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::cache::CacheError;

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    /// Nothing has ever been collected and the source is failing.
    Unavailable(String),
    BadRequest(String),
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        warn!(error = %err, "metrics request failed");
        Self::Unavailable(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
