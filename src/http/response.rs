//! Response construction for forwarded requests.
//!
//! # Responsibilities
//! - Filter upstream response headers before relaying
//! - Stamp proxy headers (`Via`, `X-Proxy-Time`, `X-Cache`)
//! - Serve cache hits
//!
//! # Design Decisions
//! - Upstream bodies are buffered so they can be cached and timed
//! - `Transfer-Encoding` and `Connection` are never relayed

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;

use crate::security::headers::is_relayed_response_header;

/// Identifier sent in `Via`, `Proxy-Agent` and the status report.
pub const PROXY_IDENTIFIER: &str = concat!("forward-proxy/", env!("CARGO_PKG_VERSION"));

pub static X_CACHE: HeaderName = HeaderName::from_static("x-cache");
pub static X_PROXY_TIME: HeaderName = HeaderName::from_static("x-proxy-time");

/// Upstream headers minus the ones that describe the upstream hop.
pub fn relayed_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if is_relayed_response_header(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Response for a freshly fetched upstream answer.
pub fn fetched(status: StatusCode, headers: HeaderMap, body: Bytes, elapsed: Duration) -> Response {
    let mut response = with_headers(status, headers, body);
    let headers = response.headers_mut();
    headers.insert(header::VIA, HeaderValue::from_static(PROXY_IDENTIFIER));
    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed.as_secs_f64())) {
        headers.insert(X_PROXY_TIME.clone(), value);
    }
    headers.insert(X_CACHE.clone(), HeaderValue::from_static("MISS"));
    response
}

/// Response served from the cache.
pub fn cached(headers: HeaderMap, body: Bytes) -> Response {
    let mut response = with_headers(StatusCode::OK, headers, body);
    response
        .headers_mut()
        .insert(X_CACHE.clone(), HeaderValue::from_static("HIT"));
    response
}

fn with_headers(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
