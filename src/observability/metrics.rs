//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): forwarded requests by method, status, cache result
//! - `proxy_request_duration_seconds` (histogram): forward latency
//! - `proxy_cache_lookups_total` (counter): cache lookups by result
//! - `proxy_denied_total` (counter): policy denials by reason
//! - `proxy_upstream_errors_total` (counter): upstream failures by kind
//! - `proxy_tunnels_total` / `proxy_tunnel_bytes_total` (counters): CONNECT sessions and bytes
//!
//! Recording is a no-op until an exporter is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, cache: &'static str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "cache" => cache
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("proxy_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_denied(reason: &'static str) {
    metrics::counter!("proxy_denied_total", "reason" => reason).increment(1);
}

pub fn record_upstream_error(kind: &'static str) {
    metrics::counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_tunnel(client_to_upstream: u64, upstream_to_client: u64) {
    metrics::counter!("proxy_tunnels_total").increment(1);
    metrics::counter!("proxy_tunnel_bytes_total", "direction" => "upstream")
        .increment(client_to_upstream);
    metrics::counter!("proxy_tunnel_bytes_total", "direction" => "downstream")
        .increment(upstream_to_client);
}
