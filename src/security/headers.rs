//! Header sanitization for forwarded requests and relayed responses.
//!
//! # Responsibilities
//! - Strip hop-by-hop and proxy-only request headers
//! - Strip client-identifying headers in anonymous mode
//! - Filter upstream response headers before relaying

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// User-Agent sent upstream in anonymous mode.
pub const GENERIC_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Request headers that only make sense on the client↔proxy hop.
const HOP_BY_HOP: [&str; 10] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Headers that can identify the client.
const IDENTIFYING: [HeaderName; 4] = [
    HeaderName::from_static("x-forwarded-for"),
    header::REFERER,
    header::COOKIE,
    header::USER_AGENT,
];

/// Build the outbound header set from the client's request headers.
pub fn outbound_request_headers(client_headers: &HeaderMap, anonymous: bool) -> HeaderMap {
    let mut headers = client_headers.clone();
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    if anonymous {
        anonymize(&mut headers);
    }
    headers
}

/// Remove identifying headers and substitute a generic User-Agent.
pub fn anonymize(headers: &mut HeaderMap) {
    for name in IDENTIFYING {
        headers.remove(name);
    }
    headers.insert(header::USER_AGENT, HeaderValue::from_static(GENERIC_USER_AGENT));
}

/// True for upstream response headers that are relayed to the client.
pub fn is_relayed_response_header(name: &HeaderName) -> bool {
    *name != header::TRANSFER_ENCODING && *name != header::CONNECTION
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::HOST, "proxy.local:6777".parse().unwrap());
        h.insert(header::USER_AGENT, "curl/8.0".parse().unwrap());
        h.insert(header::COOKIE, "session=abc".parse().unwrap());
        h.insert(header::REFERER, "http://origin.test/".parse().unwrap());
        h.insert("x-forwarded-for", "10.0.0.1".parse().unwrap());
        h.insert("proxy-connection", "keep-alive".parse().unwrap());
        h.insert(header::ACCEPT, "image/png".parse().unwrap());
        h
    }

    #[test]
    fn strips_hop_by_hop_but_keeps_identity_when_not_anonymous() {
        let out = outbound_request_headers(&client_headers(), false);
        assert!(out.get(header::HOST).is_none());
        assert!(out.get("proxy-connection").is_none());
        assert_eq!(out.get(header::USER_AGENT).unwrap(), "curl/8.0");
        assert_eq!(out.get(header::COOKIE).unwrap(), "session=abc");
        assert_eq!(out.get(header::ACCEPT).unwrap(), "image/png");
    }

    #[test]
    fn anonymous_mode_replaces_identity() {
        let out = outbound_request_headers(&client_headers(), true);
        assert!(out.get(header::COOKIE).is_none());
        assert!(out.get(header::REFERER).is_none());
        assert!(out.get("x-forwarded-for").is_none());
        assert_eq!(out.get(header::USER_AGENT).unwrap(), GENERIC_USER_AGENT);
        assert_eq!(out.get(header::ACCEPT).unwrap(), "image/png");
    }

    #[test]
    fn anonymous_mode_adds_user_agent_when_absent() {
        let mut headers = HeaderMap::new();
        anonymize(&mut headers);
        assert_eq!(headers.get(header::USER_AGENT).unwrap(), GENERIC_USER_AGENT);
    }

    #[test]
    fn response_filter() {
        assert!(!is_relayed_response_header(&header::TRANSFER_ENCODING));
        assert!(!is_relayed_response_header(&header::CONNECTION));
        assert!(is_relayed_response_header(&header::CONTENT_TYPE));
        assert!(is_relayed_response_header(&header::SET_COOKIE));
    }
}
