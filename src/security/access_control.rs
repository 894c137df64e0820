//! Client IP access control.
//!
//! Blacklist is evaluated first and always wins; an enabled whitelist then
//! admits only matching clients. With neither list enabled every client is
//! allowed.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::AccessControlConfig;
use crate::error::ProxyError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::ip_rules::IpRuleSet;

/// Client allow/deny evaluator.
#[derive(Debug, Clone)]
pub struct AccessControl {
    whitelist_enabled: bool,
    whitelist: IpRuleSet,
    blacklist_enabled: bool,
    blacklist: IpRuleSet,
}

impl AccessControl {
    pub fn from_config(config: &AccessControlConfig) -> Self {
        Self {
            whitelist_enabled: config.enable_whitelist,
            whitelist: IpRuleSet::compile(&config.whitelist, "access_control.whitelist"),
            blacklist_enabled: config.enable_blacklist,
            blacklist: IpRuleSet::compile(&config.blacklist, "access_control.blacklist"),
        }
    }

    /// Decide whether `ip` may use the proxy.
    pub fn is_client_allowed(&self, ip: IpAddr) -> bool {
        if self.blacklist_enabled && self.blacklist.matches(ip) {
            return false;
        }
        if self.whitelist_enabled {
            return self.whitelist.matches(ip);
        }
        true
    }

    /// Like [`is_client_allowed`](Self::is_client_allowed) but as a typed error.
    pub fn check(&self, ip: IpAddr) -> Result<(), ProxyError> {
        if self.is_client_allowed(ip) {
            Ok(())
        } else {
            Err(ProxyError::AccessDenied {
                client: ip.to_string(),
            })
        }
    }
}

/// Rejects requests from disallowed clients before any routing happens.
pub async fn access_control_middleware(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(e) = state.access.check(peer.ip()) {
        tracing::warn!(
            client = %peer.ip(),
            method = %request.method(),
            target = %request.uri(),
            "Blocked request from client"
        );
        metrics::record_denied(e.kind());
        return e.into_response();
    }
    next.run(request).await
}
