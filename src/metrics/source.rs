use std::fmt;
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{Disks, Networks, System};

use super::{
    format_uptime, percent, CpuInfo, DiskInfo, MemoryInfo, NetworkInfo, Snapshot,
    SystemInfo,
};

// ─── Configuration ───────────────────────────────────────────────

const ROOT_MOUNT: &str = "/";
const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * 1024 * 1024;

const RUNTIME_VERSION: &str = concat!(
    "rust ",
    env!("CARGO_PKG_RUST_VERSION"),
    " (",
    env!("CARGO_PKG_NAME"),
    " ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

// ─── Contract ────────────────────────────────────────────────────

/// Produces one fully populated snapshot per call.
///
/// Implementations are synchronous and may block (CPU sampling does); the
/// cache always calls them from the blocking pool. A failure in any one
/// category fails the whole call, so partial snapshots never exist.
pub trait MetricsSource: Send + Sync + 'static {
    fn collect(&self) -> Result<Snapshot, SourceError>;
}

/// Which part of a collection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    System,
    Memory,
    Cpu,
    Disk,
    Network,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::System => "system",
            Self::Memory => "memory",
            Self::Cpu => "cpu",
            Self::Disk => "disk",
            Self::Network => "network",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{category} metrics unavailable: {reason}")]
pub struct SourceError {
    pub category: Category,
    pub reason: String,
}

impl SourceError {
    pub fn new(category: Category, reason: impl Into<String>) -> Self {
        Self {
            category,
            reason: reason.into(),
        }
    }
}

// ─── Host implementation ─────────────────────────────────────────

/// Reads the local host through `sysinfo`.
///
/// The `System` handle is kept between calls so CPU usage is the delta
/// since the previous collection rather than since boot.
pub struct HostSource {
    state: Mutex<HostState>,
}

struct HostState {
    sys: System,
    cpu_primed: bool,
}

impl HostSource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                sys: System::new(),
                cpu_primed: false,
            }),
        }
    }
}

impl Default for HostSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for HostSource {
    fn collect(&self) -> Result<Snapshot, SourceError> {
        let mut state = self.state.lock();

        Ok(Snapshot {
            system: system_info()?,
            memory: memory_info(&mut state.sys)?,
            cpu: cpu_info(&mut state)?,
            disk: disk_info(Path::new(ROOT_MOUNT))?,
            network: network_info()?,
        })
    }
}

fn system_info() -> Result<SystemInfo, SourceError> {
    let hostname = System::host_name()
        .ok_or_else(|| SourceError::new(Category::System, "hostname not available"))?;

    Ok(SystemInfo {
        hostname,
        platform: System::distribution_id(),
        os: std::env::consts::OS.to_owned(),
        architecture: std::env::consts::ARCH.to_owned(),
        runtime_version: RUNTIME_VERSION.to_owned(),
        uptime: format_uptime(System::uptime()),
        timestamp: Utc::now(),
    })
}

fn memory_info(sys: &mut System) -> Result<MemoryInfo, SourceError> {
    sys.refresh_memory();

    let total = sys.total_memory();
    if total == 0 {
        return Err(SourceError::new(Category::Memory, "total memory reported as zero"));
    }
    let used = sys.used_memory();

    Ok(MemoryInfo {
        total_mb: total / MB,
        used_mb: used / MB,
        free_mb: sys.free_memory() / MB,
        used_percent: percent(used, total),
        timestamp: Utc::now(),
    })
}

fn cpu_info(state: &mut HostState) -> Result<CpuInfo, SourceError> {
    // The first reading has no previous sample to diff against.
    if !state.cpu_primed {
        state.sys.refresh_cpu();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        state.cpu_primed = true;
    }
    state.sys.refresh_cpu();

    let cores = state.sys.cpus().len();
    if cores == 0 {
        return Err(SourceError::new(Category::Cpu, "no cpus reported"));
    }

    Ok(CpuInfo {
        cores: u32::try_from(cores).unwrap_or(u32::MAX),
        usage_percent: f64::from(state.sys.global_cpu_info().cpu_usage()),
        timestamp: Utc::now(),
    })
}

fn disk_info(mount: &Path) -> Result<DiskInfo, SourceError> {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == mount)
        .ok_or_else(|| {
            SourceError::new(Category::Disk, format!("no disk mounted at {}", mount.display()))
        })?;

    let total = disk.total_space();
    if total == 0 {
        return Err(SourceError::new(
            Category::Disk,
            format!("{} reports zero capacity", mount.display()),
        ));
    }
    let free = disk.available_space();
    let used = total.saturating_sub(free);

    Ok(DiskInfo {
        total_gb: total / GB,
        used_gb: used / GB,
        free_gb: free / GB,
        used_percent: percent(used, total),
        timestamp: Utc::now(),
    })
}

fn network_info() -> Result<NetworkInfo, SourceError> {
    let networks = Networks::new_with_refreshed_list();

    let mut info = NetworkInfo {
        bytes_sent: 0,
        bytes_recv: 0,
        packets_sent: 0,
        packets_recv: 0,
        timestamp: Utc::now(),
    };
    let mut interfaces = 0usize;

    for (_name, data) in networks.iter() {
        interfaces += 1;
        info.bytes_sent = info.bytes_sent.saturating_add(data.total_transmitted());
        info.bytes_recv = info.bytes_recv.saturating_add(data.total_received());
        info.packets_sent = info
            .packets_sent
            .saturating_add(data.total_packets_transmitted());
        info.packets_recv = info
            .packets_recv
            .saturating_add(data.total_packets_received());
    }

    if interfaces == 0 {
        return Err(SourceError::new(Category::Network, "no network interfaces"));
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_names_the_category() {
        let err = SourceError::new(Category::Disk, "no disk mounted at /");
        assert_eq!(err.to_string(), "disk metrics unavailable: no disk mounted at /");
    }

    #[test]
    fn category_serializes_lowercase() {
        let json = serde_json::to_string(&Category::Network).unwrap();
        assert_eq!(json, "\"network\"");
    }

    #[test]
    fn runtime_version_mentions_crate() {
        assert!(RUNTIME_VERSION.starts_with("rust "));
        assert!(RUNTIME_VERSION.contains(env!("CARGO_PKG_NAME")));
    }
}
