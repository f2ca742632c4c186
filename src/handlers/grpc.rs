use tonic::{Request, Response, Status};
use tracing::warn;

use crate::cache::{CacheError, SnapshotCache};
use crate::metrics::Snapshot;

pub mod proto {
    tonic::include_proto!("monitor");
}

use proto::metric_service_server::{MetricService, MetricServiceServer};
use proto::{
    CpuMetrics, DiskMetrics, MemoryMetrics, MetricsRequest, MetricsResponse, NetworkMetrics,
    SystemMetrics,
};

// ─── MetricService ───────────────────────────────────────────────

/// gRPC front-end over the snapshot cache.
pub struct MetricsRpc {
    cache: SnapshotCache,
}

impl MetricsRpc {
    pub fn new(cache: SnapshotCache) -> Self {
        Self { cache }
    }

    pub fn into_service(self) -> MetricServiceServer<Self> {
        MetricServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl MetricService for MetricsRpc {
    async fn get_metrics(
        &self,
        _request: Request<MetricsRequest>,
    ) -> Result<Response<MetricsResponse>, Status> {
        let snapshot = self.cache.read().await.map_err(map_cache_error)?;
        Ok(Response::new(MetricsResponse::from(snapshot.as_ref())))
    }
}

fn map_cache_error(err: CacheError) -> Status {
    warn!(error = %err, "grpc metrics request failed");
    match err {
        CacheError::NoDataYet { .. } => Status::unavailable(err.to_string()),
    }
}

// ─── Conversions ─────────────────────────────────────────────────

impl From<&Snapshot> for MetricsResponse {
    fn from(s: &Snapshot) -> Self {
        Self {
            system: Some(SystemMetrics {
                hostname: s.system.hostname.clone(),
                platform: s.system.platform.clone(),
                os: s.system.os.clone(),
                architecture: s.system.architecture.clone(),
                runtime_version: s.system.runtime_version.clone(),
                uptime: s.system.uptime.clone(),
                timestamp: s.system.timestamp.to_rfc3339(),
            }),
            memory: Some(MemoryMetrics {
                total_mb: s.memory.total_mb,
                used_mb: s.memory.used_mb,
                free_mb: s.memory.free_mb,
                used_percent: s.memory.used_percent,
                timestamp: s.memory.timestamp.to_rfc3339(),
            }),
            cpu: Some(CpuMetrics {
                cores: i32::try_from(s.cpu.cores).unwrap_or(i32::MAX),
                usage_percent: s.cpu.usage_percent,
                timestamp: s.cpu.timestamp.to_rfc3339(),
            }),
            disk: Some(DiskMetrics {
                total_gb: s.disk.total_gb,
                used_gb: s.disk.used_gb,
                free_gb: s.disk.free_gb,
                used_percent: s.disk.used_percent,
                timestamp: s.disk.timestamp.to_rfc3339(),
            }),
            network: Some(NetworkMetrics {
                bytes_sent: s.network.bytes_sent,
                bytes_recv: s.network.bytes_recv,
                packets_sent: s.network.packets_sent,
                packets_recv: s.network.packets_recv,
                timestamp: s.network.timestamp.to_rfc3339(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::ScriptedSource;
    use crate::metrics::{Category, SourceError};
    use std::time::Duration;
    use tonic::Code;

    fn rpc(source: &std::sync::Arc<ScriptedSource>) -> MetricsRpc {
        MetricsRpc::new(SnapshotCache::new(source.clone(), Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn get_metrics_maps_every_category() {
        let source = ScriptedSource::new();
        let svc = rpc(&source);

        let resp = svc
            .get_metrics(Request::new(MetricsRequest {}))
            .await
            .unwrap()
            .into_inner();

        let system = resp.system.unwrap();
        assert_eq!(system.hostname, "host-1");
        assert_eq!(system.os, "linux");
        assert!(system.timestamp.starts_with("2023-11-14T"));
        assert_eq!(resp.memory.unwrap().total_mb, 1024);
        assert_eq!(resp.cpu.unwrap().cores, 1);
        assert_eq!(resp.disk.unwrap().free_gb, 60);
        assert_eq!(resp.network.unwrap().bytes_sent, 10);
    }

    #[tokio::test]
    async fn get_metrics_reads_through_cache() {
        let source = ScriptedSource::new();
        let svc = rpc(&source);

        for _ in 0..3 {
            svc.get_metrics(Request::new(MetricsRequest {})).await.unwrap();
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn no_data_maps_to_unavailable() {
        let source = ScriptedSource::new();
        source.then(Err(SourceError::new(Category::Memory, "meminfo unreadable")));
        let svc = rpc(&source);

        let status = svc
            .get_metrics(Request::new(MetricsRequest {}))
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::Unavailable);
        assert!(status.message().contains("memory"));
    }
}
