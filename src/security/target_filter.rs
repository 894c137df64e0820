//! Destination filtering.
//!
//! A host is denied when it equals a blocked domain or is a subdomain of one,
//! or when any address it resolves to falls in `blocked_ips`. Resolution
//! failures are not denials.

use std::net::IpAddr;
use std::time::Duration;

use tokio::net::lookup_host;

use crate::config::TargetFilterConfig;
use crate::error::ProxyError;
use crate::security::ip_rules::IpRuleSet;

/// Destination host/IP evaluator.
#[derive(Debug, Clone)]
pub struct TargetFilter {
    /// Lowercased, without leading dots.
    blocked_domains: Vec<String>,
    blocked_ips: IpRuleSet,
    resolve_timeout: Duration,
}

impl TargetFilter {
    pub fn from_config(config: &TargetFilterConfig, resolve_timeout: Duration) -> Self {
        let blocked_domains = config
            .blocked_domains
            .iter()
            .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        Self {
            blocked_domains,
            blocked_ips: IpRuleSet::compile(&config.blocked_ips, "target_filter.blocked_ips"),
            resolve_timeout,
        }
    }

    /// True if `host` is a blocked domain or one of its subdomains.
    pub fn is_domain_blocked(&self, host: &str) -> bool {
        let host = normalize_host(host);
        self.blocked_domains.iter().any(|domain| {
            host == *domain
                || (host.len() > domain.len()
                    && host.ends_with(domain.as_str())
                    && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
        })
    }

    /// True if `ip` matches an entry in `blocked_ips`.
    pub fn is_ip_blocked(&self, ip: IpAddr) -> bool {
        self.blocked_ips.matches(ip)
    }

    /// Decide whether the proxy may contact `host`.
    pub async fn is_target_allowed(&self, host: &str) -> bool {
        if self.is_domain_blocked(host) {
            return false;
        }
        if self.blocked_ips.is_empty() {
            return true;
        }

        let host = normalize_host(host);
        if let Ok(ip) = host.parse::<IpAddr>() {
            return !self.is_ip_blocked(ip);
        }

        let resolved = tokio::time::timeout(self.resolve_timeout, lookup_host((host.as_str(), 0))).await;
        let allowed = match resolved {
            Ok(Ok(mut addrs)) => match addrs.find(|addr| self.is_ip_blocked(addr.ip())) {
                Some(addr) => {
                    tracing::debug!(host = %host, ip = %addr.ip(), "Target resolves to blocked IP");
                    false
                }
                None => true,
            },
            Ok(Err(e)) => {
                tracing::debug!(host = %host, error = %e, "Target resolution failed, allowing");
                true
            }
            Err(_) => {
                tracing::debug!(host = %host, "Target resolution timed out, allowing");
                true
            }
        };
        allowed
    }

    /// Like [`is_target_allowed`](Self::is_target_allowed) but as a typed error.
    pub async fn check(&self, host: &str) -> Result<(), ProxyError> {
        if self.is_target_allowed(host).await {
            Ok(())
        } else {
            Err(ProxyError::TargetBlocked {
                host: host.to_string(),
            })
        }
    }
}

/// Lowercase and strip IPv6 brackets and a trailing root dot.
fn normalize_host(host: &str) -> String {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}
