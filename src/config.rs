//! Configuration for tiller-dns.
//!
//! Every knob is an environment variable under the `DNS_` prefix
//! (`DNS_PORT`, `DNS_CACHE_TTL_SECONDS`, ...), optionally layered on top of
//! a TOML file passed with `--config`. The field names below map one to one
//! onto the variable names.

use crate::error::DnsError;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the UDP DNS socket binds to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port the UDP DNS socket binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the SQLite store, shared with the control plane.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Lookup-cache TTL in seconds; 0 disables the cache.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Health-probe interval in seconds; 0 disables the checker.
    #[serde(default = "default_health_interval")]
    pub health_check_interval_seconds: u64,

    /// Per-probe timeout in milliseconds, clamped to a 250 ms floor.
    #[serde(default = "default_health_timeout")]
    pub health_check_timeout_ms: u64,

    /// Sustained queries per second allowed per source.
    #[serde(default = "default_rate_limit_qps")]
    pub rate_limit_qps: f64,

    /// Burst capacity per source.
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: f64,

    /// Cool-down in seconds once a source drains its bucket.
    #[serde(default = "default_rate_limit_block")]
    pub rate_limit_block_seconds: u64,

    /// Listen address for the DDNS update endpoint; absent disables it.
    #[serde(default)]
    pub update_listen: Option<SocketAddr>,

    /// Log level filter (e.g. "info", "tiller_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address (requires the `prometheus`
    /// feature).
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            cache_ttl_seconds: default_cache_ttl(),
            health_check_interval_seconds: default_health_interval(),
            health_check_timeout_ms: default_health_timeout(),
            rate_limit_qps: default_rate_limit_qps(),
            rate_limit_burst: default_rate_limit_burst(),
            rate_limit_block_seconds: default_rate_limit_block(),
            update_listen: None,
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus `DNS_*`
    /// environment variables, the latter taking precedence.
    pub fn load(file: Option<&Path>) -> Result<Self, DnsError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }
        builder
            .add_source(config::Environment::with_prefix("DNS").try_parsing(true))
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| DnsError::Config(e.to_string()))
    }

    /// The UDP socket address.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Lookup-cache TTL as a duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Health-probe interval as a duration.
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }

    /// Per-probe timeout as a duration, floored at 250 ms.
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms.max(250))
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    5353
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/dns.sqlite")
}

fn default_cache_ttl() -> u64 {
    5
}

fn default_health_interval() -> u64 {
    10
}

fn default_health_timeout() -> u64 {
    3000
}

fn default_rate_limit_qps() -> f64 {
    200.0
}

fn default_rate_limit_burst() -> f64 {
    400.0
}

fn default_rate_limit_block() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}
