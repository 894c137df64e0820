//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! GET request:
//!     → policy.rs (derive key from method, URL, negotiation headers)
//!     → store.rs (lookup; expired entries evicted on read)
//!     → hit: serve stored body/headers
//!     → miss: forward, then policy.rs decides admission and TTL
//! ```

pub mod policy;
pub mod store;

pub use store::{CacheStats, ResponseCache};
