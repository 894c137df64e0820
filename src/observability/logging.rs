//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber from `[logging]`
//! - Optional append-only log file next to stdout
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level when set
//! - JSON format for machine parsing, text for humans

use std::fs::{File, OpenOptions};
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};

/// Error raised while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file '{path}': {source}")]
    LogFile {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build the env filter: `RUST_LOG` if set, else the configured level.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("forward_proxy={level},proxy_cli={level},tower_http={level},warn"))
    })
}

/// Install the global subscriber. `verbose` forces debug level.
///
/// A log file that cannot be opened is left out and logging continues on
/// stdout; the open error is handed back so it can be logged once the
/// subscriber is up.
pub fn init_logging(
    config: &LoggingConfig,
    verbose: bool,
) -> Result<Option<LoggingError>, LoggingError> {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.level.to_ascii_lowercase()
    };

    let (layers, file_error) = build_layers(config);
    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(&level))
        .try_init()?;

    Ok(file_error)
}

/// Stdout layer plus the file layer when `log_to_file` is set and the file
/// opens.
fn build_layers(config: &LoggingConfig) -> (Vec<BoxedLayer>, Option<LoggingError>) {
    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    layers.push(match config.format {
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Text => fmt::layer().boxed(),
    });

    if !config.log_to_file {
        return (layers, None);
    }

    match open_log_file(&config.log_file) {
        Ok(file) => {
            let writer = Mutex::new(file);
            layers.push(match config.format {
                LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
                LogFormat::Text => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
            });
            (layers, None)
        }
        Err(e) => (layers, Some(e)),
    }
}

fn open_log_file(path: &str) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::LogFile {
            path: path.to_string(),
            source,
        })
}
