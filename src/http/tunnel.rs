//! CONNECT tunneling.
//!
//! # Data Flow
//! ```text
//! CONNECT host:port
//!     → AccessControl (client IP, before the authority is parsed)
//!     → TargetFilter (destination)
//!     → TCP connect with timeout (502 on failure)
//!     → 200 Connection Established
//!     → hyper upgrade → bidirectional byte relay until EOF, error or shutdown
//! ```
//!
//! # Design Decisions
//! - CONNECT never reaches the axum router, so the client check happens here
//! - Bytes are relayed verbatim; TLS is never terminated

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::error::{ProxyError, ProxyResult};
use crate::http::response::PROXY_IDENTIFIER;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::observability::metrics;
use crate::security::{AccessControl, TargetFilter};

/// Port used when the CONNECT authority has none.
pub const DEFAULT_TUNNEL_PORT: u16 = 443;

const RELAY_BUFFER_SIZE: usize = 8192;

static PROXY_AGENT: HeaderName = HeaderName::from_static("proxy-agent");

/// Lifecycle of a single tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Establishing,
    Active,
    Closed,
}

/// Why a relay stopped.
#[derive(Debug)]
pub enum CloseReason {
    ClientClosed,
    UpstreamClosed,
    ClientError(std::io::Error),
    UpstreamError(std::io::Error),
    Shutdown,
}

/// Byte totals for a finished relay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

/// Handles CONNECT requests.
pub struct TunnelRelay {
    access: Arc<AccessControl>,
    targets: Arc<TargetFilter>,
    connect_timeout: Duration,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
}

impl TunnelRelay {
    pub fn new(
        access: Arc<AccessControl>,
        targets: Arc<TargetFilter>,
        connect_timeout: Duration,
        tracker: ConnectionTracker,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            access,
            targets,
            connect_timeout,
            tracker,
            shutdown,
        }
    }

    /// Answer a CONNECT request.
    ///
    /// On success the relay runs in its own task once hyper hands over the
    /// upgraded connection; the returned response is the `200` that
    /// triggers the upgrade.
    pub async fn handle<B>(&self, mut req: Request<B>, peer: SocketAddr) -> Response {
        let start = Instant::now();
        let authority = req
            .uri()
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let on_upgrade = req.extensions_mut().remove::<OnUpgrade>();
        let mut session = TunnelSession::new(authority, peer);

        let (on_upgrade, upstream) = match self.open(&mut session, on_upgrade).await {
            Ok(opened) => opened,
            Err(e) => {
                match &e {
                    ProxyError::AccessDenied { .. } | ProxyError::TargetBlocked { .. } => {
                        tracing::warn!(client = %peer.ip(), target = %session.target, error = %e, "Blocked CONNECT");
                        metrics::record_denied(e.kind());
                    }
                    _ => {
                        tracing::error!(
                            client = %peer.ip(),
                            target = %session.target,
                            error = %e,
                            elapsed_secs = start.elapsed().as_secs_f64(),
                            "Tunnel setup failed"
                        );
                        metrics::record_upstream_error(e.kind());
                    }
                }
                return e.into_response();
            }
        };

        let guard = self.tracker.track();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let _guard = guard;
            match on_upgrade.await {
                Ok(upgraded) => {
                    let stats = session.relay(TokioIo::new(upgraded), upstream, &mut shutdown).await;
                    metrics::record_tunnel(stats.client_to_upstream, stats.upstream_to_client);
                }
                Err(e) => {
                    // The 200 is already out; the client only sees the socket close.
                    let e = ProxyError::TunnelSetup(e.to_string());
                    session.state = TunnelState::Closed;
                    tracing::warn!(client = %peer.ip(), target = %session.target, error = %e, "CONNECT upgrade failed");
                    metrics::record_upstream_error(e.kind());
                }
            }
        });

        established_response()
    }

    /// Run the policy checks and connect for `session`, moving it to
    /// [`TunnelState::Closed`] on any failure.
    async fn open(
        &self,
        session: &mut TunnelSession,
        on_upgrade: Option<OnUpgrade>,
    ) -> ProxyResult<(OnUpgrade, TcpStream)> {
        let established = self.establish(&session.target, session.client).await;
        let opened = match established {
            Ok((host, port, upstream)) => {
                session.target = format!("{host}:{port}");
                on_upgrade.map(|upgrade| (upgrade, upstream)).ok_or_else(|| {
                    ProxyError::TunnelSetup("client connection cannot be upgraded".into())
                })
            }
            Err(e) => Err(e),
        };
        if opened.is_err() {
            session.state = TunnelState::Closed;
        }
        opened
    }

    async fn establish(
        &self,
        authority: &str,
        peer: SocketAddr,
    ) -> ProxyResult<(String, u16, TcpStream)> {
        self.access.check(peer.ip())?;
        let (host, port) = parse_host_port(authority)?;
        self.targets.check(&host).await?;

        let addr = format!("{host}:{port}");
        let upstream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((host.as_str(), port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ProxyError::UpstreamUnreachable {
                    addr,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ProxyError::UpstreamUnreachable {
                    addr,
                    message: format!("connect timed out after {:?}", self.connect_timeout),
                })
            }
        };
        let _ = upstream.set_nodelay(true);
        Ok((host, port, upstream))
    }
}

fn established_response() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(PROXY_AGENT.clone(), HeaderValue::from_static(PROXY_IDENTIFIER));
    response
        .extensions_mut()
        .insert(hyper::ext::ReasonPhrase::from_static(b"Connection Established"));
    response
}

/// Parse a CONNECT authority into host and port.
///
/// - `allowed.test:8443` -> ("allowed.test", 8443)
/// - `allowed.test` -> ("allowed.test", 443)
/// - `[::1]:443` -> ("::1", 443)
pub fn parse_host_port(authority: &str) -> ProxyResult<(String, u16)> {
    let invalid = || ProxyError::InvalidTarget(format!("invalid CONNECT target '{authority}'"));
    if authority.is_empty() {
        return Err(invalid());
    }

    if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
        let port = match after.strip_prefix(':') {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None if after.is_empty() => DEFAULT_TUNNEL_PORT,
            None => return Err(invalid()),
        };
        return Ok((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| invalid())?;
            Ok((host.to_string(), port))
        }
        Some(_) => Err(invalid()),
        None => Ok((authority.to_string(), DEFAULT_TUNNEL_PORT)),
    }
}

/// One CONNECT tunnel, from the request until the relay ends.
#[derive(Debug)]
pub struct TunnelSession {
    pub target: String,
    pub client: SocketAddr,
    pub state: TunnelState,
    opened: Instant,
}

impl TunnelSession {
    pub fn new(target: String, client: SocketAddr) -> Self {
        Self {
            target,
            client,
            state: TunnelState::Establishing,
            opened: Instant::now(),
        }
    }

    /// Copy bytes both ways until either side closes or fails, or shutdown
    /// is signalled. Both streams are dropped (closed) on return.
    pub async fn relay<C, U>(
        &mut self,
        client: C,
        upstream: U,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> RelayStats
    where
        C: AsyncRead + AsyncWrite + Unpin,
        U: AsyncRead + AsyncWrite + Unpin,
    {
        self.state = TunnelState::Active;
        tracing::info!(client = %self.client.ip(), target = %self.target, "Tunnel established");

        let (mut client_read, mut client_write) = tokio::io::split(client);
        let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);
        let mut stats = RelayStats::default();

        let reason = {
            let upstream_bound = pump(&mut client_read, &mut upstream_write, &mut stats.client_to_upstream);
            let client_bound = pump(&mut upstream_read, &mut client_write, &mut stats.upstream_to_client);

            tokio::select! {
                res = upstream_bound => match res {
                    Ok(()) => CloseReason::ClientClosed,
                    Err(PumpError::Read(e)) => CloseReason::ClientError(e),
                    Err(PumpError::Write(e)) => CloseReason::UpstreamError(e),
                },
                res = client_bound => match res {
                    Ok(()) => CloseReason::UpstreamClosed,
                    Err(PumpError::Read(e)) => CloseReason::UpstreamError(e),
                    Err(PumpError::Write(e)) => CloseReason::ClientError(e),
                },
                _ = shutdown.recv() => CloseReason::Shutdown,
            }
        };

        self.state = TunnelState::Closed;
        tracing::info!(
            client = %self.client.ip(),
            target = %self.target,
            reason = ?reason,
            bytes_up = stats.client_to_upstream,
            bytes_down = stats.upstream_to_client,
            duration_secs = self.opened.elapsed().as_secs_f64(),
            "Tunnel closed"
        );
        stats
    }
}

enum PumpError {
    Read(std::io::Error),
    Write(std::io::Error),
}

/// Copy `reader` into `writer` until EOF. Short writes are completed before
/// the next read.
async fn pump<R, W>(reader: &mut R, writer: &mut W, total: &mut u64) -> Result<(), PumpError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await.map_err(PumpError::Read)?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await.map_err(PumpError::Write)?;
        writer.flush().await.map_err(PumpError::Write)?;
        *total += n as u64;
    }
}
