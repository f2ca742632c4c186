use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheInfo;
use crate::config::MAX_CACHE_TTL_MS;
use crate::AppState;

use super::AppError;

// ─── Request types ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TtlUpdate {
    pub ttl_ms: u64,
}

// ─── GET /cache ──────────────────────────────────────────────────

pub async fn inspect(State(state): State<Arc<AppState>>) -> Json<CacheInfo> {
    Json(state.cache.inspect())
}

// ─── PUT /cache/ttl ──────────────────────────────────────────────

pub async fn set_ttl(
    State(state): State<Arc<AppState>>,
    Json(update): Json<TtlUpdate>,
) -> Result<Json<CacheInfo>, AppError> {
    if update.ttl_ms == 0 || update.ttl_ms > MAX_CACHE_TTL_MS {
        return Err(AppError::BadRequest(format!(
            "ttl_ms must be between 1 and {MAX_CACHE_TTL_MS}"
        )));
    }

    state
        .cache
        .set_freshness_window(Duration::from_millis(update.ttl_ms));
    Ok(Json(state.cache.inspect()))
}

// ─── DELETE /cache ───────────────────────────────────────────────

pub async fn invalidate(State(state): State<Arc<AppState>>) -> StatusCode {
    state.cache.invalidate();
    StatusCode::NO_CONTENT
}
