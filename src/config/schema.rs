//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the forwarding proxy.
///
/// Loaded once at startup and shared read-only with every subsystem.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener and upstream limits.
    pub server: ServerConfig,

    /// Client IP allow/deny lists.
    pub access_control: AccessControlConfig,

    /// Destination host/IP block lists.
    pub target_filter: TargetFilterConfig,

    /// Cache, anonymization and upstream trust toggles.
    pub advanced: AdvancedConfig,

    /// Log output settings.
    pub logging: LoggingConfig,

    /// Prometheus exporter settings.
    pub metrics: MetricsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host (e.g., "0.0.0.0").
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Upstream connect/response timeout in seconds.
    pub timeout: u64,

    /// Listen backlog for pending connections.
    pub max_connections: u32,

    /// Maximum buffered request body size in bytes.
    pub max_body_bytes: usize,

    /// Maximum buffered upstream response body size in bytes.
    pub max_response_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6777,
            timeout: 30,
            max_connections: 100,
            max_body_bytes: 10 * 1024 * 1024, // 10MB
            max_response_bytes: 100 * 1024 * 1024, // 100MB
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Client access control lists.
///
/// Entries are single IPs (`10.1.2.3`) or CIDR ranges (`10.0.0.0/8`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessControlConfig {
    pub enable_whitelist: bool,
    pub whitelist: Vec<String>,
    pub enable_blacklist: bool,
    pub blacklist: Vec<String>,
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        Self {
            enable_whitelist: false,
            whitelist: vec!["127.0.0.1".to_string()],
            enable_blacklist: false,
            blacklist: Vec::new(),
        }
    }
}

/// Destination filtering.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TargetFilterConfig {
    /// Domains blocked together with all of their subdomains.
    pub blocked_domains: Vec<String>,

    /// Destination IPs or CIDR ranges that may not be reached.
    pub blocked_ips: Vec<String>,
}

/// Feature toggles.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdvancedConfig {
    /// Enable the in-memory response cache.
    pub enable_cache: bool,

    /// Cache capacity in megabytes.
    pub cache_size_mb: u64,

    /// Strip client-identifying headers before forwarding.
    pub anonymous_mode: bool,

    /// Accept any upstream TLS certificate without verification.
    ///
    /// The proxy cannot vouch for origin identity on behalf of its clients
    /// in this mode. Turn it off to require valid certificates.
    pub accept_invalid_certs: bool,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            enable_cache: false,
            cache_size_mb: 100,
            anonymous_mode: true,
            accept_invalid_certs: true,
        }
    }
}

impl AdvancedConfig {
    /// Cache capacity in bytes.
    pub fn cache_capacity_bytes(&self) -> u64 {
        self.cache_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Also append log lines to `log_file`.
    pub log_to_file: bool,

    /// Path of the log file.
    pub log_file: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_file: "proxy.log".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus scrape endpoint.
    pub enabled: bool,

    /// Scrape endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9090".to_string(),
        }
    }
}
