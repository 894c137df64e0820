//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: ProxyConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load configuration, falling back to built-in defaults on any error.
///
/// A missing or broken config file never stops the proxy from starting.
/// Called before logging is initialized, so the returned error (if any) is
/// handed back for the caller to report.
pub fn load_or_default(path: Option<&Path>) -> (ProxyConfig, Option<ConfigError>) {
    match path {
        None => (ProxyConfig::default(), None),
        Some(path) => match load_config(path) {
            Ok(config) => (config, None),
            Err(e) => (ProxyConfig::default(), Some(e)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [server]
            host = "127.0.0.1"
            port = 7000

            [access_control]
            enable_blacklist = true
            blacklist = ["203.0.113.0/24"]

            [advanced]
            enable_cache = true
            cache_size_mb = 8
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind_address(), "127.0.0.1:7000");
        assert!(config.access_control.enable_blacklist);
        assert_eq!(config.advanced.cache_capacity_bytes(), 8 * 1024 * 1024);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, err) = load_or_default(Some(&dir.path().join("absent.toml")));
        assert!(matches!(err, Some(ConfigError::Io(_))));
        assert_eq!(config.server.port, 6777);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();

        let (config, err) = load_or_default(Some(file.path()));
        assert!(matches!(err, Some(ConfigError::Parse(_))));
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\ntimeout = 0").unwrap();

        let (config, err) = load_or_default(Some(file.path()));
        assert!(matches!(err, Some(ConfigError::Validation(_))));
        assert_eq!(config.server.timeout, 30);
        assert!(err.unwrap().to_string().contains("server.timeout"));
    }
}
