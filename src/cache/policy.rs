//! Cacheability rules: key derivation, admissible content types and TTL.

use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode};

/// TTL used when the upstream sends no `max-age`.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Upper bound on any stored TTL (2^31 seconds).
pub const MAX_TTL: Duration = Duration::from_secs(1 << 31);

/// Request headers that take part in content negotiation.
const VARY_HEADERS: [&str; 3] = ["Accept", "Accept-Encoding", "Accept-Language"];

const CACHEABLE_TYPES: [&str; 5] = [
    "text/",
    "image/",
    "application/javascript",
    "application/json",
    "application/xml",
];

/// Derive the cache key for a request. Only GET requests have one.
///
/// The same derivation is used for lookup and store.
pub fn cache_key(method: &Method, url: &str, headers: &HeaderMap) -> Option<String> {
    if *method != Method::GET {
        return None;
    }

    let mut negotiation = serde_json::Map::new();
    for name in VARY_HEADERS {
        if let Some(value) = headers.get(name) {
            negotiation.insert(
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned().into(),
            );
        }
    }

    Some(format!(
        "{}:{}:{}",
        method,
        url,
        serde_json::Value::Object(negotiation)
    ))
}

/// True if a response with this `Content-Type` may be cached.
pub fn is_cacheable_content_type(content_type: &str) -> bool {
    let content_type = content_type.trim().to_ascii_lowercase();
    CACHEABLE_TYPES.iter().any(|t| content_type.starts_with(t))
}

/// True if an upstream response to `method` may be stored at all.
pub fn is_cacheable_response(method: &Method, status: StatusCode, headers: &HeaderMap) -> bool {
    *method == Method::GET
        && status == StatusCode::OK
        && headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_cacheable_content_type)
}

/// TTL from a `Cache-Control` value's `max-age`, else [`DEFAULT_TTL`].
///
/// The result never exceeds [`MAX_TTL`].
pub fn ttl_from_cache_control(cache_control: Option<&str>) -> Duration {
    cache_control
        .into_iter()
        .flat_map(|v| v.split(','))
        .filter_map(|directive| {
            let (name, value) = directive.trim().split_once('=')?;
            if name.trim().eq_ignore_ascii_case("max-age") {
                parse_delta_seconds(value.trim().trim_matches('"'))
            } else {
                None
            }
        })
        .map(|secs| Duration::from_secs(secs).min(MAX_TTL))
        .next()
        .unwrap_or(DEFAULT_TTL)
}

/// Delta-seconds saturate instead of failing on overflow.
fn parse_delta_seconds(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(value.parse::<u64>().unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn only_get_has_a_key() {
        let headers = HeaderMap::new();
        assert!(cache_key(&Method::GET, "http://a.test/", &headers).is_some());
        assert!(cache_key(&Method::POST, "http://a.test/", &headers).is_none());
        assert!(cache_key(&Method::HEAD, "http://a.test/", &headers).is_none());
    }

    #[test]
    fn key_depends_on_negotiation_headers_only() {
        let mut a = HeaderMap::new();
        a.insert(header::ACCEPT, "image/png".parse().unwrap());
        a.insert(header::USER_AGENT, "one".parse().unwrap());

        let mut b = HeaderMap::new();
        b.insert(header::ACCEPT, "image/png".parse().unwrap());
        b.insert(header::USER_AGENT, "two".parse().unwrap());

        let mut c = HeaderMap::new();
        c.insert(header::ACCEPT, "image/webp".parse().unwrap());

        let url = "http://example.test/a.png";
        let ka = cache_key(&Method::GET, url, &a).unwrap();
        assert_eq!(ka, cache_key(&Method::GET, url, &b).unwrap());
        assert_ne!(ka, cache_key(&Method::GET, url, &c).unwrap());
        assert_eq!(ka, r#"GET:http://example.test/a.png:{"Accept":"image/png"}"#);
    }

    #[test]
    fn content_types() {
        assert!(is_cacheable_content_type("text/html; charset=utf-8"));
        assert!(is_cacheable_content_type("image/png"));
        assert!(is_cacheable_content_type("Application/JSON"));
        assert!(is_cacheable_content_type("application/javascript"));
        assert!(!is_cacheable_content_type("application/octet-stream"));
        assert!(!is_cacheable_content_type("video/mp4"));
    }

    #[test]
    fn response_cacheability() {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_TYPE, "image/png".parse().unwrap());
        assert!(is_cacheable_response(&Method::GET, StatusCode::OK, &h));
        assert!(!is_cacheable_response(&Method::GET, StatusCode::NOT_FOUND, &h));
        assert!(!is_cacheable_response(&Method::POST, StatusCode::OK, &h));
        assert!(!is_cacheable_response(&Method::GET, StatusCode::OK, &HeaderMap::new()));
    }

    #[test]
    fn ttl_parsing() {
        assert_eq!(ttl_from_cache_control(None), DEFAULT_TTL);
        assert_eq!(ttl_from_cache_control(Some("no-cache")), DEFAULT_TTL);
        assert_eq!(
            ttl_from_cache_control(Some("public, max-age=60")),
            Duration::from_secs(60)
        );
        assert_eq!(
            ttl_from_cache_control(Some("MAX-AGE=5, s-maxage=100")),
            Duration::from_secs(5)
        );
        assert_eq!(ttl_from_cache_control(Some("max-age=abc")), DEFAULT_TTL);
        assert_eq!(ttl_from_cache_control(Some("max-age=-5")), DEFAULT_TTL);
    }

    #[test]
    fn huge_max_age_is_clamped() {
        assert_eq!(
            ttl_from_cache_control(Some("max-age=18446744073709551615")),
            MAX_TTL
        );
        assert_eq!(
            ttl_from_cache_control(Some("max-age=999999999999999999999999")),
            MAX_TTL
        );
        assert_eq!(
            ttl_from_cache_control(Some("max-age=2147483648")),
            MAX_TTL
        );
        assert_eq!(
            ttl_from_cache_control(Some("max-age=2147483647")),
            Duration::from_secs(2_147_483_647)
        );
    }
}
