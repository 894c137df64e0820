//! Compiled IP / CIDR match lists.
//!
//! Shared by client access control and destination filtering. Entries are
//! parsed once at startup; anything that is neither an IP address nor a CIDR
//! range is dropped with a warning and can never match.

use std::net::IpAddr;

use ipnet::IpNet;

#[derive(Debug, Clone, PartialEq, Eq)]
enum IpRule {
    Exact(IpAddr),
    Net(IpNet),
}

impl IpRule {
    fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        if s.contains('/') {
            s.parse::<IpNet>().ok().map(IpRule::Net)
        } else {
            s.parse::<IpAddr>().ok().map(|ip| IpRule::Exact(ip.to_canonical()))
        }
    }

    fn matches(&self, ip: &IpAddr) -> bool {
        match self {
            IpRule::Exact(x) => x == ip,
            IpRule::Net(n) => n.contains(ip),
        }
    }
}

/// An immutable list of IP and CIDR rules.
#[derive(Debug, Clone, Default)]
pub struct IpRuleSet {
    rules: Vec<IpRule>,
}

impl IpRuleSet {
    /// Compile raw config entries. `list` names the source list in warnings.
    pub fn compile(entries: &[String], list: &str) -> Self {
        let mut rules = Vec::with_capacity(entries.len());
        for raw in entries {
            match IpRule::parse(raw) {
                Some(rule) => rules.push(rule),
                None => tracing::warn!(list, entry = %raw, "Ignoring malformed IP/CIDR entry"),
            }
        }
        Self { rules }
    }

    /// True if `ip` equals an exact entry or falls inside a CIDR entry.
    ///
    /// IPv4-mapped IPv6 addresses are compared as plain IPv4.
    pub fn matches(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.rules.iter().any(|rule| rule.matches(&ip))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
