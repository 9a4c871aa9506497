use std::path::PathBuf;
use std::time::Duration;

use crate::hub::{FanoutPolicy, HubConfig};

/// Hub configuration
///
/// # Environment variables
///
/// Every field can be overridden from the environment:
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | WORK_DIR | ./work_dir | logs, catalog, archive |
/// | HTTP_PORT | 3000 | ops HTTP port |
/// | MESSAGE_TCP_PORT | 8081 | message bus TCP port |
/// | ENVIRONMENT | development | development / production |
/// | LOG_LEVEL | info | default log filter |
/// | ORDER_EVICTION_GRACE_MS | 60000 | delay before a finished order leaves the backlog |
/// | CHANNEL_CAPACITY | 1024 | hub command queue |
/// | OUTBOUND_CAPACITY | 256 | per-connection outbound queue |
/// | FANOUT_POLICY | all | `all` or `interested` |
///
/// # Example
///
/// ```ignore
/// WORK_DIR=/data/cafe HTTP_PORT=8080 cargo run -p sync-hub
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory (logs, catalog.json, archive)
    pub work_dir: String,
    /// Ops HTTP port
    pub http_port: u16,
    /// Message bus TCP port
    pub message_tcp_port: u16,
    /// development | production
    pub environment: String,
    /// Default log level
    pub log_level: String,
    /// Grace window before terminal orders are evicted (ms)
    pub order_eviction_grace_ms: u64,
    /// Hub command queue capacity
    pub channel_capacity: usize,
    /// Per-connection outbound queue capacity
    pub outbound_capacity: usize,
    /// Status-update fan-out policy
    pub fanout_policy: FanoutPolicy,
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./work_dir".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            message_tcp_port: std::env::var("MESSAGE_TCP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8081),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            order_eviction_grace_ms: std::env::var("ORDER_EVICTION_GRACE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60_000),
            channel_capacity: std::env::var("CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(1024),
            outbound_capacity: std::env::var("OUTBOUND_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(256),
            fanout_policy: std::env::var("FANOUT_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// Override a subset of fields
    ///
    /// Mostly used by tests
    pub fn with_overrides(
        work_dir: impl Into<String>,
        http_port: u16,
        message_tcp_port: u16,
    ) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config.message_tcp_port = message_tcp_port;
        config
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    pub fn catalog_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("catalog.json")
    }

    pub fn archive_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("archive")
    }

    pub fn tcp_listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.message_tcp_port)
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            eviction_grace: Duration::from_millis(self.order_eviction_grace_ms),
            fanout: self.fanout_policy,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_live_under_work_dir() {
        let config = Config::with_overrides("/tmp/cafe", 3001, 9001);
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/cafe/logs"));
        assert_eq!(config.catalog_path(), PathBuf::from("/tmp/cafe/catalog.json"));
        assert_eq!(config.archive_dir(), PathBuf::from("/tmp/cafe/archive"));
        assert_eq!(config.tcp_listen_addr(), "0.0.0.0:9001");
    }

    #[test]
    fn test_hub_config_from_grace_ms() {
        let mut config = Config::with_overrides("/tmp/cafe", 3001, 9001);
        config.order_eviction_grace_ms = 1500;
        config.fanout_policy = FanoutPolicy::Interested;

        let hub = config.hub_config();
        assert_eq!(hub.eviction_grace, Duration::from_millis(1500));
        assert_eq!(hub.fanout, FanoutPolicy::Interested);
    }
}
