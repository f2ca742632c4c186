use axum::{extract::State, Json};
use std::sync::Arc;

use crate::metrics::Snapshot;
use crate::AppState;

use super::AppError;

// ─── GET /metrics ────────────────────────────────────────────────

pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Arc<Snapshot>>, AppError> {
    let snapshot = state.cache.read().await?;
    Ok(Json(snapshot))
}
