//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming connection/request:
//!     → access_control.rs (client IP blacklist, then whitelist)
//!     → target_filter.rs (blocked domains, resolved blocked IPs)
//!     → headers.rs (strip hop-by-hop, anonymize)
//!     → Forward or tunnel
//! ```
//!
//! # Design Decisions
//! - All lists compiled once at startup, read-only afterwards
//! - Fail closed on policy matches, fail open on DNS errors
//! - Malformed list entries are skipped, never fatal

pub mod access_control;
pub mod headers;
pub mod ip_rules;
pub mod target_filter;

pub use access_control::AccessControl;
pub use target_filter::TargetFilter;
