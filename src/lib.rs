//! Forward HTTP/HTTPS proxy library.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, ProxyResult};
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
