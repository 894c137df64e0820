//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Reject unknown log levels
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Malformed IP/CIDR list entries are not errors here; the matchers skip them

use crate::config::schema::ProxyConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a parsed configuration for out-of-range values.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(ValidationError {
            field: "server.port",
            message: "must be between 1 and 65535".into(),
        });
    }
    if config.server.timeout == 0 {
        errors.push(ValidationError {
            field: "server.timeout",
            message: "must be greater than zero".into(),
        });
    }
    if config.server.max_connections == 0 {
        errors.push(ValidationError {
            field: "server.max_connections",
            message: "must be greater than zero".into(),
        });
    }
    if config.server.max_response_bytes == 0 {
        errors.push(ValidationError {
            field: "server.max_response_bytes",
            message: "must be greater than zero".into(),
        });
    }
    if config.advanced.enable_cache && config.advanced.cache_size_mb == 0 {
        errors.push(ValidationError {
            field: "advanced.cache_size_mb",
            message: "must be greater than zero when caching is enabled".into(),
        });
    }
    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError {
            field: "logging.level",
            message: format!("unknown level '{}'", config.logging.level),
        });
    }
    if config.metrics.enabled && config.metrics.address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: "metrics.address",
            message: format!("'{}' is not a socket address", config.metrics.address),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
