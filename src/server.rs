use axum::{
    middleware as axum_mw,
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Metrics ─────────────────────────────────────────────
        .route("/metrics", get(handlers::rest::get_metrics))
        // ── Cache administration ────────────────────────────────
        .route(
            "/cache",
            get(handlers::cache_admin::inspect).delete(handlers::cache_admin::invalidate),
        )
        .route("/cache/ttl", put(handlers::cache_admin::set_ttl))
        // ── WebSocket & session statistics ──────────────────────
        .route("/ws", get(handlers::websocket::ws_handler))
        .route("/stats", get(handlers::websocket::server_stats))
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
