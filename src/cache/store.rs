//! Bounded, TTL-aware response store.
//!
//! # Responsibilities
//! - Store response bodies and headers keyed by request identity
//! - Expire entries on read once their TTL has elapsed
//! - Keep total stored bytes within capacity via batch LRU eviction
//! - Count hits and misses for the status endpoint
//!
//! # Design Decisions
//! - One mutex guards entries, occupancy and counters together, so no caller
//!   ever observes a half-evicted or half-written entry
//! - Entries larger than 10% of capacity are silently refused
//! - Overflow evicts least-recently-accessed entries until occupancy is
//!   below half of capacity, instead of one victim at a time

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::HeaderMap;
use serde::Serialize;

/// A stored response. Never handed out; callers receive clones of the parts.
#[derive(Debug)]
struct CacheEntry {
    body: Bytes,
    headers: HeaderMap,
    size: u64,
    expires_at: Instant,
    last_access: Instant,
    /// Tie-breaker for entries touched within the same clock tick.
    access_seq: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    current_size: u64,
    hits: u64,
    misses: u64,
    next_seq: u64,
}

impl CacheState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.current_size -= entry.size;
                true
            }
            None => false,
        }
    }
}

/// Snapshot of cache occupancy and lookup counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub items: usize,
    pub size: u64,
    pub max_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
}

/// Thread-safe response cache shared by every connection handler.
#[derive(Debug)]
pub struct ResponseCache {
    state: Mutex<CacheState>,
    max_size: u64,
}

impl ResponseCache {
    /// Create an empty cache holding at most `max_size` body bytes.
    pub fn new(max_size: u64) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_size,
        }
    }

    /// Look up `key`, counting a hit or a miss.
    ///
    /// Expired entries are removed and reported as misses.
    pub fn get(&self, key: &str) -> Option<(Bytes, HeaderMap)> {
        let mut state = self.state.lock().expect("response cache mutex poisoned");
        let now = Instant::now();

        let expired = match state.entries.get(key) {
            Some(entry) => entry.expires_at <= now,
            None => {
                state.misses += 1;
                return None;
            }
        };

        if expired {
            state.remove(key);
            state.misses += 1;
            return None;
        }

        let seq = state.next_seq();
        state.hits += 1;
        let entry = state.entries.get_mut(key)?;
        entry.last_access = now;
        entry.access_seq = seq;
        Some((entry.body.clone(), entry.headers.clone()))
    }

    /// Store a response for `ttl`.
    ///
    /// Bodies over 10% of capacity, and TTLs whose expiry cannot be
    /// represented, are ignored without error.
    pub fn set(&self, key: impl Into<String>, body: Bytes, headers: HeaderMap, ttl: Duration) {
        let size = body.len() as u64;
        if size.saturating_mul(10) > self.max_size {
            tracing::trace!(size, max_size = self.max_size, "Response too large to cache");
            return;
        }

        let now = Instant::now();
        let Some(expires_at) = now.checked_add(ttl) else {
            tracing::trace!(ttl_secs = ttl.as_secs(), "TTL out of range, not caching");
            return;
        };

        let key = key.into();
        let mut state = self.state.lock().expect("response cache mutex poisoned");
        state.remove(&key);

        if state.current_size + size > self.max_size {
            self.evict(&mut state);
        }

        let seq = state.next_seq();
        state.entries.insert(
            key,
            CacheEntry {
                body,
                headers,
                size,
                expires_at,
                last_access: now,
                access_seq: seq,
            },
        );
        state.current_size += size;
    }

    /// Drop `key` if present.
    pub fn remove(&self, key: &str) {
        let mut state = self.state.lock().expect("response cache mutex poisoned");
        state.remove(key);
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().expect("response cache mutex poisoned");
        let lookups = state.hits + state.misses;
        CacheStats {
            items: state.entries.len(),
            size: state.current_size,
            max_size: self.max_size,
            hits: state.hits,
            misses: state.misses,
            hit_ratio: if lookups > 0 {
                state.hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Evict least-recently-accessed entries until below half of capacity.
    fn evict(&self, state: &mut CacheState) {
        let mut order: Vec<(Instant, u64, String)> = state
            .entries
            .iter()
            .map(|(k, e)| (e.last_access, e.access_seq, k.clone()))
            .collect();
        order.sort_unstable();

        let before = state.entries.len();
        for (_, _, key) in order {
            if state.current_size.saturating_mul(2) < self.max_size {
                break;
            }
            state.remove(&key);
        }

        tracing::debug!(
            evicted = before - state.entries.len(),
            remaining_bytes = state.current_size,
            max_size = self.max_size,
            "Cache eviction"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_TYPE, content_type.parse().unwrap());
        h
    }

    fn body(len: usize) -> Bytes {
        Bytes::from(vec![b'x'; len])
    }

    #[test]
    fn round_trip() {
        let cache = ResponseCache::new(1024 * 1024);
        cache.set("k", Bytes::from_static(b"hello"), headers("text/plain"), Duration::from_secs(60));

        let (b, h) = cache.get("k").unwrap();
        assert_eq!(b, Bytes::from_static(b"hello"));
        assert_eq!(h.get(header::CONTENT_TYPE).unwrap(), "text/plain");

        let stats = cache.stats();
        assert_eq!(stats.items, 1);
        assert_eq!(stats.size, 5);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn expired_entry_is_removed_and_missed() {
        let cache = ResponseCache::new(1024);
        cache.set("k", body(10), HeaderMap::new(), Duration::from_millis(30));
        assert!(cache.get("k").is_some());

        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("k").is_none());

        let stats = cache.stats();
        assert_eq!(stats.items, 0);
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn zero_ttl_never_served() {
        let cache = ResponseCache::new(1024);
        cache.set("k", body(10), HeaderMap::new(), Duration::ZERO);
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn unrepresentable_ttl_is_skipped() {
        let cache = ResponseCache::new(1024);
        cache.set("k", body(10), HeaderMap::new(), Duration::MAX);
        assert!(cache.get("k").is_none());

        // The cache stays usable afterwards.
        cache.set("k", body(10), HeaderMap::new(), Duration::from_secs(60));
        assert!(cache.get("k").is_some());
        assert_eq!(cache.stats().items, 1);
    }

    #[test]
    fn oversized_entries_refused() {
        let cache = ResponseCache::new(1000);
        cache.set("big", body(101), HeaderMap::new(), Duration::from_secs(60));
        assert!(cache.get("big").is_none());
        assert_eq!(cache.stats().size, 0);

        cache.set("edge", body(100), HeaderMap::new(), Duration::from_secs(60));
        assert!(cache.get("edge").is_some());
    }

    #[test]
    fn overwrite_releases_previous_size() {
        let cache = ResponseCache::new(1000);
        cache.set("k", body(80), HeaderMap::new(), Duration::from_secs(60));
        cache.set("k", body(30), HeaderMap::new(), Duration::from_secs(60));
        let stats = cache.stats();
        assert_eq!(stats.items, 1);
        assert_eq!(stats.size, 30);
    }

    #[test]
    fn overflow_evicts_lru_below_half() {
        let cache = ResponseCache::new(1000);
        for i in 0..10 {
            cache.set(format!("k{i}"), body(100), HeaderMap::new(), Duration::from_secs(60));
        }
        assert_eq!(cache.stats().size, 1000);

        // Refresh k0 and k1 so they become the most recently used.
        assert!(cache.get("k0").is_some());
        assert!(cache.get("k1").is_some());

        cache.set("k10", body(100), HeaderMap::new(), Duration::from_secs(60));

        let stats = cache.stats();
        assert_eq!(stats.size, 500);
        assert_eq!(stats.items, 5);
        for kept in ["k0", "k1", "k8", "k9", "k10"] {
            assert!(cache.get(kept).is_some(), "{kept} should survive");
        }
        for evicted in ["k2", "k3", "k4", "k5", "k6", "k7"] {
            assert!(cache.get(evicted).is_none(), "{evicted} should be evicted");
        }
    }

    #[test]
    fn occupancy_never_exceeds_capacity() {
        let cache = ResponseCache::new(10_000);
        for i in 0..500 {
            let len = 1 + (i * 37) % 1000;
            cache.set(format!("k{i}"), body(len), HeaderMap::new(), Duration::from_secs(60));
            assert!(cache.stats().size <= 10_000);
        }
    }

    #[test]
    fn remove_and_hit_ratio() {
        let cache = ResponseCache::new(1000);
        assert_eq!(cache.stats().hit_ratio, 0.0);

        cache.set("a", body(10), HeaderMap::new(), Duration::from_secs(60));
        assert!(cache.get("a").is_some());
        cache.remove("a");
        assert!(cache.get("a").is_none());
        cache.remove("a");

        let stats = cache.stats();
        assert_eq!(stats.items, 0);
        assert_eq!(stats.hit_ratio, 0.5);
    }

    #[test]
    fn concurrent_access_is_consistent() {
        let cache = std::sync::Arc::new(ResponseCache::new(50_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("t{t}-{}", i % 20);
                        cache.set(key.clone(), body(100 + i % 50), HeaderMap::new(), Duration::from_secs(60));
                        let _ = cache.get(&key);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stats = cache.stats();
        assert!(stats.size <= 50_000);
        assert_eq!(stats.hits + stats.misses, 8 * 200);
    }
}
