//! TCP listener implementation.
//!
//! # Responsibilities
//! - Bind to the configured host/port
//! - Apply `max_connections` as the kernel accept backlog
//! - Accept incoming TCP connections without waiting on request handling

use std::net::SocketAddr;

use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};

use crate::config::ServerConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A TCP listener with a configured accept backlog.
pub struct Listener {
    inner: TcpListener,
    backlog: u32,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ListenerError> {
        let addr = resolve_bind_address(config).await?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(ListenerError::Bind)?;
        socket.set_reuseaddr(true).map_err(ListenerError::Bind)?;
        socket.bind(addr).map_err(ListenerError::Bind)?;

        let backlog = config.max_connections.max(1);
        let inner = socket.listen(backlog).map_err(ListenerError::Bind)?;

        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %local_addr,
            backlog,
            "Listener bound"
        );

        Ok(Self { inner, backlog })
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer_addr = %addr, error = %e, "Failed to set TCP_NODELAY");
        }
        tracing::debug!(peer_addr = %addr, "Connection accepted");
        Ok((stream, addr))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Configured accept backlog.
    pub fn backlog(&self) -> u32 {
        self.backlog
    }
}

async fn resolve_bind_address(config: &ServerConfig) -> Result<SocketAddr, ListenerError> {
    let bind = config.bind_address();
    if let Ok(addr) = bind.parse() {
        return Ok(addr);
    }
    let resolved = lookup_host(bind.as_str())
        .await
        .map_err(ListenerError::Bind)?
        .next()
        .ok_or_else(|| {
            ListenerError::Bind(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no address for {}", bind),
            ))
        });
    resolved
}
