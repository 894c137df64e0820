//! Startup reporting.
//!
//! Startup order lives in `main`: config, logging, metrics, listener, server.
//! This module only announces the running configuration once the listener is
//! bound.

use std::net::SocketAddr;

use crate::config::ProxyConfig;
use crate::http::status::STATUS_PATH;

/// Log what the proxy is about to serve.
pub fn announce(config: &ProxyConfig, local_addr: SocketAddr) {
    tracing::info!(
        address = %local_addr,
        timeout_secs = config.server.timeout,
        backlog = config.server.max_connections,
        whitelist = config.access_control.enable_whitelist,
        blacklist = config.access_control.enable_blacklist,
        blocked_domains = config.target_filter.blocked_domains.len(),
        blocked_ips = config.target_filter.blocked_ips.len(),
        cache = config.advanced.enable_cache,
        anonymous_mode = config.advanced.anonymous_mode,
        accept_invalid_certs = config.advanced.accept_invalid_certs,
        "Forward proxy running"
    );
    tracing::info!(
        "Proxy status available at http://localhost:{}{}",
        local_addr.port(),
        STATUS_PATH
    );
    if config.advanced.accept_invalid_certs {
        tracing::warn!("Upstream TLS certificates are NOT verified (advanced.accept_invalid_certs)");
    }
}
