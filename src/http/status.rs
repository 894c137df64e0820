//! `/proxy-status` reporting.
//!
//! Only a GET with an origin-form target is answered locally; an
//! absolute-form request whose path happens to be `/proxy-status` is still
//! forwarded.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::cache::CacheStats;
use crate::http::forward::forward_handler;
use crate::http::response::PROXY_IDENTIFIER;
use crate::http::server::AppState;

pub const STATUS_PATH: &str = "/proxy-status";

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub server: ServerSection,
    pub config: ConfigSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
}

#[derive(Debug, Serialize)]
pub struct ServerSection {
    pub version: &'static str,
    /// Whole seconds since startup.
    pub uptime: u64,
    pub start_time: String,
    /// Configured connection backlog.
    pub connections: u32,
}

#[derive(Debug, Serialize)]
pub struct ConfigSection {
    pub host: String,
    pub port: u16,
    pub timeout: u64,
    pub anonymous_mode: bool,
    pub cache_enabled: bool,
}

impl StatusReport {
    pub fn collect(state: &AppState) -> Self {
        let config = &state.config;
        Self {
            server: ServerSection {
                version: PROXY_IDENTIFIER,
                uptime: state.info.started_at.elapsed().as_secs(),
                start_time: state.info.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                connections: config.server.max_connections,
            },
            config: ConfigSection {
                host: config.server.host.clone(),
                port: config.server.port,
                timeout: config.server.timeout,
                anonymous_mode: config.advanced.anonymous_mode,
                cache_enabled: config.advanced.enable_cache,
            },
            cache: state.cache.as_ref().map(|c| c.stats()),
        }
    }
}

pub async fn status_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    if request.method() != Method::GET || request.uri().authority().is_some() {
        return forward_handler(State(state), ConnectInfo(peer), request).await;
    }

    tracing::debug!(client = %peer.ip(), "Serving status report");
    match serde_json::to_string_pretty(&StatusReport::collect(&state)) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize status report");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
