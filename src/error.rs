//! Error types for proxy operations.
//!
//! Every failure a client can observe maps to exactly one HTTP status:
//! - Policy denials (client IP, destination) → 403
//! - Upstream network/timeout failures → 504
//! - Unreachable tunnel targets, unusable upstream answers and failed tunnel
//!   setup → 502

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Unified error type for request handling.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Client IP rejected by the access lists.
    #[error("Forbidden: Your IP is not allowed to use this proxy")]
    AccessDenied { client: String },

    /// Destination host or IP is blocked.
    #[error("Forbidden: Access to {host} is blocked")]
    TargetBlocked { host: String },

    /// The request target could not be turned into an upstream URL.
    #[error("Bad Request: {0}")]
    InvalidTarget(String),

    /// Client request body could not be read.
    #[error("Bad Request: {0}")]
    RequestBody(String),

    /// Request body exceeded `server.max_body_bytes`.
    #[error("Payload Too Large: request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Upstream did not answer in time or the network path failed.
    #[error("Gateway Timeout: {0}")]
    UpstreamTimeout(String),

    /// TCP connection to the upstream could not be opened.
    #[error("Bad Gateway: failed to connect to '{addr}': {message}")]
    UpstreamUnreachable {
        /// The address we tried to connect to.
        addr: String,
        message: String,
    },

    /// Upstream answered with something we could not relay.
    #[error("Bad Gateway: {0}")]
    Protocol(String),

    /// Upstream body exceeded `server.max_response_bytes`.
    #[error("Bad Gateway: upstream response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    /// CONNECT tunnel could not be set up.
    #[error("Bad Gateway: tunnel setup failed: {0}")]
    TunnelSetup(String),

    /// Upstream HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// I/O error (socket operations, file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    /// HTTP status reported to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::AccessDenied { .. } | ProxyError::TargetBlocked { .. } => {
                StatusCode::FORBIDDEN
            }
            ProxyError::InvalidTarget(_) | ProxyError::RequestBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamUnreachable { .. }
            | ProxyError::Protocol(_)
            | ProxyError::ResponseTooLarge { .. }
            | ProxyError::TunnelSetup(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Client(_) | ProxyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::AccessDenied { .. } => "access_denied",
            ProxyError::TargetBlocked { .. } => "target_blocked",
            ProxyError::InvalidTarget(_) => "invalid_target",
            ProxyError::RequestBody(_) => "request_body",
            ProxyError::BodyTooLarge { .. } => "body_too_large",
            ProxyError::UpstreamTimeout(_) => "upstream_timeout",
            ProxyError::UpstreamUnreachable { .. } => "upstream_unreachable",
            ProxyError::Protocol(_) => "protocol",
            ProxyError::ResponseTooLarge { .. } => "response_too_large",
            ProxyError::TunnelSetup(_) => "tunnel_setup",
            ProxyError::Client(_) => "client",
            ProxyError::Io(_) => "io",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
