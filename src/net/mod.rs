//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, backlog)
//!     → connection.rs (lifecycle tracking)
//!     → Hand off to HTTP layer (one task per connection)
//! ```
//!
//! # Design Decisions
//! - Accepting never waits on request processing
//! - Each connection and tunnel tracked for graceful shutdown

pub mod connection;
pub mod listener;
