//! Request target resolution.
//!
//! # Responsibilities
//! - Turn the request target into the upstream URL
//! - Extract the destination host for policy checks
//! - Decide whether the client body is forwarded
//!
//! # Design Decisions
//! - Absolute-form targets (`GET http://host/path`) are used as is
//! - Origin-form targets are read as `/host/path` and fetched over plain HTTP

use axum::http::{Method, Uri};
use url::Url;

use crate::error::ProxyError;

/// Build the upstream URL string for a request target.
pub fn target_url(uri: &Uri) -> String {
    let raw = uri.to_string();
    if raw.starts_with("http") {
        raw
    } else {
        format!("http://{}", raw.strip_prefix('/').unwrap_or(&raw))
    }
}

/// A parsed upstream destination.
#[derive(Debug, Clone)]
pub struct Target {
    pub url: Url,
    pub host: String,
}

impl Target {
    /// Parse a target URL built by [`target_url`].
    pub fn parse(raw: &str) -> Result<Self, ProxyError> {
        let url = Url::parse(raw)
            .map_err(|e| ProxyError::InvalidTarget(format!("'{raw}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidTarget(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProxyError::InvalidTarget(format!("'{raw}' has no host")))?
            .to_string();
        Ok(Self { url, host })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// Only these methods have their body forwarded upstream.
pub fn carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}
