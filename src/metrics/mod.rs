pub mod percentiles;
pub mod source;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use source::{Category, HostSource, MetricsSource, SourceError};

// ─── Snapshot ────────────────────────────────────────────────────

/// One complete set of host metrics captured by a single `collect()`.
///
/// Each sub-record carries its own capture timestamp; they may differ by
/// microseconds but always come from the same collection pass.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub system: SystemInfo,
    pub memory: MemoryInfo,
    pub cpu: CpuInfo,
    pub disk: DiskInfo,
    pub network: NetworkInfo,
}

/// Host identity.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub hostname: String,
    /// Distribution id, e.g. "ubuntu"
    pub platform: String,
    /// OS family, e.g. "linux"
    pub os: String,
    pub architecture: String,
    pub runtime_version: String,
    /// Compact duration such as "72h3m5s"
    pub uptime: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryInfo {
    pub total_mb: u64,
    pub used_mb: u64,
    pub free_mb: u64,
    /// 0–100
    pub used_percent: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CpuInfo {
    /// Logical core count
    pub cores: u32,
    /// Aggregate across all cores, 0–100
    pub usage_percent: f64,
    pub timestamp: DateTime<Utc>,
}

/// Capacity of the root mount point.
#[derive(Debug, Clone, Serialize)]
pub struct DiskInfo {
    pub total_gb: u64,
    pub used_gb: u64,
    pub free_gb: u64,
    pub used_percent: f64,
    pub timestamp: DateTime<Utc>,
}

/// Cumulative counters summed over every interface.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub timestamp: DateTime<Utc>,
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Renders whole seconds the way `72h3m5s` reads: hours are never folded
/// into days, and inner zero components are kept.
pub fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// `part / whole` as a percentage, 0 when `whole` is 0.
pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_keeps_hours_unfolded() {
        assert_eq!(format_uptime(0), "0s");
        assert_eq!(format_uptime(59), "59s");
        assert_eq!(format_uptime(60), "1m0s");
        assert_eq!(format_uptime(3600), "1h0m0s");
        assert_eq!(format_uptime(72 * 3600 + 3 * 60 + 5), "72h3m5s");
    }

    #[test]
    fn percent_handles_empty_whole() {
        assert_eq!(percent(5, 0), 0.0);
        assert!((percent(1, 4) - 25.0).abs() < f64::EPSILON);
    }
}
