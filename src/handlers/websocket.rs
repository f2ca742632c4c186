use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics::Snapshot;
use crate::AppState;

// ─── Configuration ───────────────────────────────────────────────

/// Largest inbound frame accepted from a client (1 MiB)
const MAX_MESSAGE_BYTES: usize = 1 << 20;

/// Every N-th message overall carries a metrics snapshot
const SNAPSHOT_EVERY: u64 = 50;

/// Client message that asks for a snapshot plus server statistics
const STATS_REQUEST: &str = "STATS";

// ─── Session counters ────────────────────────────────────────────

/// Process-wide WebSocket session statistics. Unrelated to the
/// snapshot cache; these count traffic, not host metrics.
pub struct SessionStats {
    messages: AtomicU64,
    connections: AtomicU64,
    started: Instant,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            messages: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Register a new connection and return its id (1-based).
    fn connected(&self) -> u64 {
        self.connections.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count one inbound message and return its global sequence number.
    fn message(&self) -> u64 {
        self.messages.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn total_messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    fn total_connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Wire types ──────────────────────────────────────────────────

/// Reply sent for every text frame a client sends.
#[derive(Debug, Serialize)]
pub struct Reply {
    pub message_id: u64,
    /// Unix milliseconds
    pub server_timestamp: i64,
    pub client_message: String,
    pub connection_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Arc<Snapshot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_stats: Option<ServerStats>,
}

#[derive(Debug, Serialize)]
pub struct ServerStats {
    pub total_messages: u64,
    pub uptime_seconds: f64,
    pub connections: u64,
    pub worker_threads: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_messages: u64,
    pub uptime_seconds: f64,
    pub total_connections: u64,
    pub worker_threads: usize,
    pub server_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Arc<Snapshot>>,
}

// ─── GET /ws ─────────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.max_message_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| session(socket, state))
}

async fn session(mut socket: WebSocket, state: Arc<AppState>) {
    let conn_id = state.sessions.connected();
    info!(conn_id, "websocket connection opened");

    while let Some(frame) = socket.recv().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by axum; binary frames are ignored
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id, error = %e, "websocket read failed");
                break;
            }
        };

        let reply = reply_to(&state, conn_id, text).await;
        let json = match serde_json::to_string(&reply) {
            Ok(json) => json,
            Err(e) => {
                warn!(conn_id, error = %e, "failed to encode reply");
                serde_json::json!({ "error": "failed to encode reply" }).to_string()
            }
        };

        if let Err(e) = socket.send(Message::Text(json)).await {
            debug!(conn_id, error = %e, "websocket write failed");
            break;
        }
    }

    info!(conn_id, "websocket connection closed");
}

/// Build the reply for one client message.
pub async fn reply_to(state: &AppState, conn_id: u64, message: String) -> Reply {
    let message_id = state.sessions.message();
    let wants_stats = message == STATS_REQUEST;

    let mut reply = Reply {
        message_id,
        server_timestamp: Utc::now().timestamp_millis(),
        client_message: message,
        connection_id: conn_id,
        system: None,
        error: None,
        server_stats: None,
    };

    if message_id % SNAPSHOT_EVERY == 0 || wants_stats {
        match state.cache.read().await {
            Ok(snapshot) => reply.system = Some(snapshot),
            Err(e) => reply.error = Some(e.to_string()),
        }

        if wants_stats {
            reply.server_stats = Some(ServerStats {
                total_messages: message_id,
                uptime_seconds: state.sessions.uptime_secs(),
                connections: state.sessions.total_connections(),
                worker_threads: worker_threads(),
            });
        }
    }

    reply
}

// ─── GET /stats ──────────────────────────────────────────────────

pub async fn server_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let system = match state.cache.read().await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            debug!(error = %e, "stats served without metrics");
            None
        }
    };

    Json(StatsResponse {
        total_messages: state.sessions.total_messages(),
        uptime_seconds: state.sessions.uptime_secs(),
        total_connections: state.sessions.total_connections(),
        worker_threads: worker_threads(),
        server_time: Utc::now(),
        system,
    })
}

fn worker_threads() -> usize {
    tokio::runtime::Handle::current().metrics().num_workers()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::ScriptedSource;
    use crate::metrics::{Category, SourceError};

    #[tokio::test]
    async fn plain_message_is_echoed_without_metrics() {
        let source = ScriptedSource::new();
        let state = AppState::for_tests(source.clone());

        let reply = reply_to(&state, 7, "hello".into()).await;

        assert_eq!(reply.message_id, 1);
        assert_eq!(reply.connection_id, 7);
        assert_eq!(reply.client_message, "hello");
        assert!(reply.system.is_none());
        assert!(reply.server_stats.is_none());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn stats_request_carries_snapshot_and_counters() {
        let source = ScriptedSource::new();
        let state = AppState::for_tests(source.clone());
        let conn_id = state.sessions.connected();

        let reply = reply_to(&state, conn_id, STATS_REQUEST.into()).await;

        assert_eq!(reply.system.as_ref().unwrap().cpu.cores, 1);
        let stats = reply.server_stats.unwrap();
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.connections, 1);
        assert!(stats.worker_threads >= 1);
    }

    #[tokio::test]
    async fn every_fiftieth_message_carries_snapshot() {
        let source = ScriptedSource::new();
        let state = AppState::for_tests(source.clone());

        for _ in 1..SNAPSHOT_EVERY {
            assert!(reply_to(&state, 1, "tick".into()).await.system.is_none());
        }
        let reply = reply_to(&state, 1, "tick".into()).await;

        assert_eq!(reply.message_id, SNAPSHOT_EVERY);
        assert!(reply.system.is_some());
        assert!(reply.server_stats.is_none());
    }

    #[tokio::test]
    async fn missing_metrics_become_error_field() {
        let source = ScriptedSource::new();
        source.then(Err(SourceError::new(Category::Cpu, "no cpus reported")));
        let state = AppState::for_tests(source);

        let reply = reply_to(&state, 1, STATS_REQUEST.into()).await;

        assert!(reply.system.is_none());
        assert!(reply.error.unwrap().contains("cpu"));
        let json = serde_json::to_value(&reply.server_stats).unwrap();
        assert_eq!(json["total_messages"], 1);
    }

    #[test]
    fn connection_ids_are_sequential() {
        let stats = SessionStats::new();
        assert_eq!(stats.connected(), 1);
        assert_eq!(stats.connected(), 2);
        assert_eq!(stats.total_connections(), 2);
    }
}
