use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Largest freshness window accepted from the command line or the admin API.
pub const MAX_CACHE_TTL_MS: u64 = 60_000;

/// Command-line / environment configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "host-monitor")]
#[command(about = "Serves cached host metrics over HTTP, WebSocket and gRPC", long_about = None)]
#[command(version)]
pub struct Config {
    /// Address the HTTP / WebSocket server binds to
    #[arg(long, env = "MONITOR_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Address the gRPC `MetricService` binds to
    #[arg(long, env = "MONITOR_GRPC_LISTEN", default_value = "0.0.0.0:50051")]
    pub grpc_listen: SocketAddr,

    /// How long a collected snapshot is served before the next read refreshes it
    #[arg(
        long,
        env = "MONITOR_CACHE_TTL_MS",
        default_value_t = 100,
        value_parser = clap::value_parser!(u64).range(1..=MAX_CACHE_TTL_MS)
    )]
    pub cache_ttl_ms: u64,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "MONITOR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "MONITOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::try_parse_from(["host-monitor"]).unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.grpc_listen.port(), 50051);
        assert_eq!(cfg.cache_ttl(), Duration::from_millis(100));
        assert_eq!(cfg.log_format, LogFormat::Text);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        assert!(Config::try_parse_from(["host-monitor", "--cache-ttl-ms", "0"]).is_err());
    }

    #[test]
    fn ttl_above_admin_limit_is_rejected() {
        let limit = MAX_CACHE_TTL_MS.to_string();
        let over = (MAX_CACHE_TTL_MS + 1).to_string();

        let cfg = Config::try_parse_from(["host-monitor", "--cache-ttl-ms", limit.as_str()]).unwrap();
        assert_eq!(cfg.cache_ttl_ms, MAX_CACHE_TTL_MS);
        assert!(Config::try_parse_from(["host-monitor", "--cache-ttl-ms", over.as_str()]).is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = Config::try_parse_from([
            "host-monitor",
            "--listen",
            "127.0.0.1:9000",
            "--cache-ttl-ms",
            "250",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cfg.listen.port(), 9000);
        assert_eq!(cfg.cache_ttl_ms, 250);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }
}
