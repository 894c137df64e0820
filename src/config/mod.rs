//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On any load failure:
//!     → warning logged
//!     → built-in defaults used
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AccessControlConfig;
pub use schema::AdvancedConfig;
pub use schema::LogFormat;
pub use schema::LoggingConfig;
pub use schema::MetricsConfig;
pub use schema::ProxyConfig;
pub use schema::ServerConfig;
pub use schema::TargetFilterConfig;
