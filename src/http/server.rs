//! HTTP server setup and connection handling.
//!
//! # Responsibilities
//! - Build shared state and the Axum router
//! - Serve each accepted connection on its own task (HTTP/1.1 with upgrades)
//! - Dispatch CONNECT to the tunnel relay, everything else to the router
//! - Drain connections and tunnels on shutdown

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::ConnectInfo,
    http::{Method, Request},
    middleware,
    routing::get,
    Router,
};
use chrono::{DateTime, Local};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::cache::ResponseCache;
use crate::config::ProxyConfig;
use crate::error::ProxyResult;
use crate::http::forward::{forward_handler, RequestForwarder};
use crate::http::status::{status_handler, STATUS_PATH};
use crate::http::tunnel::TunnelRelay;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::Listener;
use crate::security::access_control::access_control_middleware;
use crate::security::{AccessControl, TargetFilter};

/// When the server came up.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub started_at: Instant,
    pub start_time: DateTime<Local>,
}

impl ServerInfo {
    pub fn now() -> Self {
        Self {
            started_at: Instant::now(),
            start_time: Local::now(),
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub access: Arc<AccessControl>,
    pub forwarder: Arc<RequestForwarder>,
    pub tunnels: Arc<TunnelRelay>,
    pub cache: Option<Arc<ResponseCache>>,
    pub info: Arc<ServerInfo>,
}

/// Forward proxy server.
pub struct ProxyServer {
    state: AppState,
    router: Router,
    tracker: ConnectionTracker,
    /// Fired once the accept loop stops; every connection and tunnel listens.
    drain: Shutdown,
}

impl ProxyServer {
    /// Create a new server with the given configuration.
    pub fn new(config: ProxyConfig) -> ProxyResult<Self> {
        let config = Arc::new(config);
        let timeout = Duration::from_secs(config.server.timeout);

        let access = Arc::new(AccessControl::from_config(&config.access_control));
        let targets = Arc::new(TargetFilter::from_config(&config.target_filter, timeout));
        let cache = config
            .advanced
            .enable_cache
            .then(|| Arc::new(ResponseCache::new(config.advanced.cache_capacity_bytes())));

        let client = RequestForwarder::build_client(&config)?;
        let forwarder = Arc::new(RequestForwarder::new(
            client,
            targets.clone(),
            cache.clone(),
            config.advanced.anonymous_mode,
            config.server.max_response_bytes,
        ));

        let tracker = ConnectionTracker::new();
        let drain = Shutdown::new();
        let tunnels = Arc::new(TunnelRelay::new(
            access.clone(),
            targets,
            timeout,
            tracker.clone(),
            drain.clone(),
        ));

        let state = AppState {
            config,
            access,
            forwarder,
            tunnels,
            cache,
            info: Arc::new(ServerInfo::now()),
        };

        let router = build_router(state.clone());
        Ok(Self {
            state,
            router,
            tracker,
            drain,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` fires, then drain within `server.timeout`.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> ProxyResult<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Proxy server accepting connections");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }
        drop(listener);

        self.drain.trigger();
        let deadline = Duration::from_secs(self.state.config.server.timeout);
        if !self.tracker.wait_for_drain(deadline).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain deadline passed, abandoning open connections"
            );
        }
        tracing::info!("Proxy server stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let guard = self.tracker.track();
        let router = self.router.clone();
        let tunnels = self.state.tunnels.clone();
        let header_timeout = Duration::from_secs(self.state.config.server.timeout);
        let mut drain = self.drain.subscribe();

        tokio::spawn(async move {
            tracing::debug!(connection_id = %guard.id(), client = %peer, "Connection accepted");

            let service = service_fn(move |mut req: Request<Incoming>| {
                let router = router.clone();
                let tunnels = tunnels.clone();
                req.extensions_mut().insert(ConnectInfo(peer));
                async move {
                    if req.method() == Method::CONNECT {
                        Ok::<_, Infallible>(tunnels.handle(req, peer).await)
                    } else {
                        router.oneshot(req).await
                    }
                }
            });

            let conn = http1::Builder::new()
                .timer(TokioTimer::new())
                .header_read_timeout(header_timeout)
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades();
            tokio::pin!(conn);

            tokio::select! {
                res = conn.as_mut() => {
                    if let Err(e) = res {
                        tracing::debug!(client = %peer, error = %e, "Connection ended with error");
                    }
                }
                _ = drain.recv() => {
                    conn.as_mut().graceful_shutdown();
                    if let Err(e) = conn.as_mut().await {
                        tracing::debug!(client = %peer, error = %e, "Connection ended during shutdown");
                    }
                }
            }
            drop(guard);
        });
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(STATUS_PATH, get(status_handler).fallback(forward_handler))
        .fallback(forward_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            access_control_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
