use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

mod cache;
mod config;
mod handlers;
mod metrics;
mod middleware;
mod server;
mod telemetry;

use cache::SnapshotCache;
use handlers::websocket::SessionStats;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Most-recent host snapshot, refreshed on demand.
    pub cache: SnapshotCache,

    /// WebSocket traffic counters; not part of the cache.
    pub sessions: SessionStats,
}

impl AppState {
    pub fn new(cache: SnapshotCache) -> Self {
        Self {
            cache,
            sessions: SessionStats::new(),
        }
    }

    #[cfg(test)]
    pub fn for_tests(source: Arc<dyn metrics::MetricsSource>) -> Arc<Self> {
        let cache = SnapshotCache::new(source, std::time::Duration::from_secs(60));
        Arc::new(Self::new(cache))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration & logging ───────────────────────────────
    let config = config::Config::parse();
    telemetry::init_tracing(&config.log_level, config.log_format);

    // ── 2. Build shared state ────────────────────────────────────
    let source = Arc::new(metrics::HostSource::new());
    let cache = SnapshotCache::new(source, config.cache_ttl());
    let state = Arc::new(AppState::new(cache.clone()));

    // Warm the cache so the first client doesn't pay for CPU priming
    if let Err(e) = cache.read().await {
        tracing::warn!(error = %e, "initial metrics collection failed");
    }

    // ── 3. Build Axum router & gRPC service ──────────────────────
    let app = server::create_router(state);
    let rpc = handlers::grpc::MetricsRpc::new(cache).into_service();

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;

    info!(
        addr = %config.listen,
        grpc_addr = %config.grpc_listen,
        cache_ttl_ms = config.cache_ttl_ms,
        "host monitor listening (GET /metrics, GET /ws, GET /stats, /cache, MetricService/GetMetrics)"
    );

    // One signal stops both servers
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let http = {
        let mut rx = shutdown_rx.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.wait_for(|stop| *stop).await;
                })
                .await
                .context("http server exited with error")
        }
    };

    let grpc_addr = config.grpc_listen;
    let grpc = {
        let mut rx = shutdown_rx;
        async move {
            tonic::transport::Server::builder()
                .add_service(rpc)
                .serve_with_shutdown(grpc_addr, async move {
                    let _ = rx.wait_for(|stop| *stop).await;
                })
                .await
                .with_context(|| format!("grpc server on {grpc_addr} exited with error"))
        }
    };

    tokio::try_join!(http, grpc)?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
