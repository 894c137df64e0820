//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper HTTP/1.1 with upgrades, one task per connection)
//!     → CONNECT: tunnel.rs (policy, upstream connect, byte relay)
//!     → otherwise Axum router:
//!         → access control middleware
//!         → status.rs (GET /proxy-status)
//!         → forward.rs (request.rs target, cache, upstream, response.rs)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;
pub mod status;
pub mod tunnel;

pub use forward::RequestForwarder;
pub use response::PROXY_IDENTIFIER;
pub use server::{AppState, ProxyServer};
pub use tunnel::TunnelRelay;
