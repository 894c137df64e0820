//! Plain HTTP forwarding.
//!
//! # Data Flow
//! ```text
//! forward_handler
//!     → request.rs (target URL, host)
//!     → TargetFilter (403 on blocked destination)
//!     → ResponseCache lookup (GET only, X-Cache: HIT)
//!     → upstream request (sanitized headers, body for POST/PUT/PATCH)
//!     → upstream body, capped at server.max_response_bytes (502 beyond it)
//!     → response.rs (relay headers, Via, X-Proxy-Time, X-Cache: MISS)
//!     → ResponseCache store (cacheable 200 GET responses)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

use crate::cache::{policy, ResponseCache};
use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::http::request::{self, Target};
use crate::http::response;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::headers::outbound_request_headers;
use crate::security::TargetFilter;

/// Forwards non-CONNECT requests to their origin.
pub struct RequestForwarder {
    client: reqwest::Client,
    targets: Arc<TargetFilter>,
    cache: Option<Arc<ResponseCache>>,
    anonymous: bool,
    max_response_bytes: usize,
}

impl RequestForwarder {
    pub fn new(
        client: reqwest::Client,
        targets: Arc<TargetFilter>,
        cache: Option<Arc<ResponseCache>>,
        anonymous: bool,
        max_response_bytes: usize,
    ) -> Self {
        Self {
            client,
            targets,
            cache,
            anonymous,
            max_response_bytes,
        }
    }

    /// Build the upstream client from config.
    ///
    /// Redirects are returned to the client, never followed, and environment
    /// proxy settings are ignored.
    pub fn build_client(config: &ProxyConfig) -> ProxyResult<reqwest::Client> {
        let timeout = Duration::from_secs(config.server.timeout);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(config.advanced.accept_invalid_certs)
            .no_proxy()
            .build()?;
        Ok(client)
    }

    /// Fetch `target_url` for the client and build the response to relay.
    pub async fn forward(
        &self,
        method: &Method,
        target_url: &str,
        client_headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> ProxyResult<Response> {
        let start = Instant::now();
        let target = Target::parse(target_url)?;
        self.targets.check(&target.host).await?;

        let cache_key = self
            .cache
            .as_ref()
            .and_then(|_| policy::cache_key(method, target.as_str(), client_headers));

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            let hit = cache.get(key);
            metrics::record_cache_lookup(hit.is_some());
            if let Some((body, headers)) = hit {
                tracing::info!(method = %method, url = %target.as_str(), "Cache hit");
                return Ok(response::cached(headers, body));
            }
        }

        let mut upstream = self
            .client
            .request(method.clone(), target.url.clone())
            .headers(outbound_request_headers(client_headers, self.anonymous));
        if let Some(body) = body {
            upstream = upstream.body(body);
        }

        let upstream = upstream.send().await.map_err(classify)?;
        let status = upstream.status();
        let upstream_headers = upstream.headers().clone();
        let body = read_upstream_body(upstream, self.max_response_bytes).await?;
        let elapsed = start.elapsed();

        tracing::info!(
            method = %method,
            url = %target.as_str(),
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_secs = elapsed.as_secs_f64(),
            "Forwarded request"
        );

        let relayed = response::relayed_headers(&upstream_headers);

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            if policy::is_cacheable_response(method, status, &upstream_headers) {
                let ttl = policy::ttl_from_cache_control(
                    upstream_headers
                        .get(header::CACHE_CONTROL)
                        .and_then(|v| v.to_str().ok()),
                );
                tracing::debug!(url = %target.as_str(), ttl_secs = ttl.as_secs(), "Caching response");
                cache.set(key, body.clone(), relayed.clone(), ttl);
            }
        }

        Ok(response::fetched(status, relayed, body, elapsed))
    }
}

/// Buffer the upstream body, refusing anything over `limit` bytes.
async fn read_upstream_body(mut upstream: reqwest::Response, limit: usize) -> ProxyResult<Bytes> {
    if upstream
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(ProxyError::ResponseTooLarge { limit });
    }

    let mut body = Vec::new();
    while let Some(chunk) = upstream.chunk().await.map_err(classify)? {
        if body.len() + chunk.len() > limit {
            return Err(ProxyError::ResponseTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(body))
}

/// Timeouts and failures to reach or send to the origin become 504. An
/// origin that answered with something unusable becomes 502.
fn classify(e: reqwest::Error) -> ProxyError {
    let detail = error_chain(&e);
    if e.is_timeout() || e.is_connect() {
        ProxyError::UpstreamTimeout(detail)
    } else if e.is_request() && !is_malformed_response(&e) {
        ProxyError::UpstreamTimeout(detail)
    } else {
        ProxyError::Protocol(detail)
    }
}

/// True if hyper rejected what the origin sent back.
fn is_malformed_response(e: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(e);
    while let Some(cause) = source {
        if let Some(err) = cause.downcast_ref::<hyper::Error>() {
            return err.is_parse()
                || err.is_parse_status()
                || err.is_parse_too_large()
                || err.is_incomplete_message();
        }
        source = cause.source();
    }
    false
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Axum entry point for every non-CONNECT request that is not the status page.
pub async fn forward_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let target_url = request::target_url(request.uri());
    let span = tracing::info_span!("forward", client = %peer.ip(), method = %method, target = %target_url);

    async move {
        let (parts, body) = request.into_parts();

        let result = match read_body(&method, &parts.headers, body, state.config.server.max_body_bytes).await {
            Ok(body) => {
                state
                    .forwarder
                    .forward(&method, &target_url, &parts.headers, body)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(relayed) => {
                let cache = relayed
                    .headers()
                    .get(&response::X_CACHE)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| if v == "HIT" { "hit" } else { "miss" })
                    .unwrap_or("none");
                metrics::record_request(method.as_str(), relayed.status().as_u16(), cache, start);
                relayed
            }
            Err(e) => {
                let elapsed_secs = start.elapsed().as_secs_f64();
                match &e {
                    ProxyError::TargetBlocked { host } => {
                        tracing::warn!(host = %host, "Blocked request to host");
                        metrics::record_denied(e.kind());
                    }
                    ProxyError::InvalidTarget(_)
                    | ProxyError::RequestBody(_)
                    | ProxyError::BodyTooLarge { .. } => {
                        tracing::warn!(error = %e, "Rejected request");
                    }
                    _ => {
                        tracing::error!(error = %e, elapsed_secs, "Upstream request failed");
                        metrics::record_upstream_error(e.kind());
                    }
                }
                metrics::record_request(method.as_str(), e.status_code().as_u16(), "none", start);
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn read_body(
    method: &Method,
    headers: &HeaderMap,
    body: axum::body::Body,
    limit: usize,
) -> ProxyResult<Option<Bytes>> {
    if !request::carries_body(method) {
        return Ok(None);
    }

    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(ProxyError::BodyTooLarge { limit });
    }

    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(_) if declared.is_none() => Err(ProxyError::BodyTooLarge { limit }),
        Err(e) => Err(ProxyError::RequestBody(e.to_string())),
    }
}
