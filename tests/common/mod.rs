//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use forward_proxy::config::ProxyConfig;
use forward_proxy::net::listener::Listener;
use forward_proxy::{ProxyResult, ProxyServer, Shutdown};

/// Canned answer from a mock backend.
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub extra_headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn ok(content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type,
            extra_headers: Vec::new(),
            body: body.into(),
        }
    }
}

/// A mock origin that counts hits and records raw requests.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicU32>,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn hit_count(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<String> {
        self.requests.lock().unwrap().last().cloned()
    }
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let (task_hits, task_requests) = (hits.clone(), requests.clone());
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let hits = task_hits.clone();
                    let requests = task_requests.clone();
                    tokio::spawn(async move {
                        let raw = read_request(&mut socket).await;
                        hits.fetch_add(1, Ordering::SeqCst);
                        requests.lock().unwrap().push(raw.clone());

                        let response = f(raw).await;
                        let status_text = match response.status {
                            200 => "200 OK",
                            201 => "201 Created",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            _ => "200 OK",
                        };
                        let mut head = format!(
                            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                            status_text,
                            response.content_type,
                            response.body.len()
                        );
                        for (name, value) in &response.extra_headers {
                            head.push_str(&format!("{name}: {value}\r\n"));
                        }
                        head.push_str("\r\n");
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(response.body.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockBackend {
        addr,
        hits,
        requests,
    }
}

/// Start a backend that always answers with `response`.
pub async fn start_mock_backend(content_type: &'static str, body: &'static str) -> MockBackend {
    start_programmable_backend(move |_| async move { MockResponse::ok(content_type, body) }).await
}

/// Start a backend that reads one request per connection and then writes
/// `reply` verbatim, whether or not it is valid HTTP.
pub async fn start_raw_backend(reply: &'static [u8]) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let (task_hits, task_requests) = (hits.clone(), requests.clone());
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let hits = task_hits.clone();
            let requests = task_requests.clone();
            tokio::spawn(async move {
                let raw = read_request(&mut socket).await;
                hits.fetch_add(1, Ordering::SeqCst);
                requests.lock().unwrap().push(raw);
                let _ = socket.write_all(reply).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockBackend {
        addr,
        hits,
        requests,
    }
}

/// Read one HTTP/1.1 request (head plus `Content-Length` body).
async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        data.extend_from_slice(&buf[..n]);
        if let Some(end) = find_head_end(&data) {
            let head = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

fn find_head_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Start a TCP echo server, used as a CONNECT destination.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = socket.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

/// A running proxy bound to an ephemeral localhost port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<ProxyResult<()>>,
}

impl TestProxy {
    /// Client that sends every request through this proxy.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(format!("http://{}", self.addr)).unwrap())
            .pool_max_idle_per_host(0)
            .build()
            .unwrap()
    }

    /// Client that talks to the proxy as an ordinary server.
    pub fn direct_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_proxy(mut config: ProxyConfig) -> TestProxy {
    config.server.host = "127.0.0.1".into();
    config.server.port = 0;
    config.server.timeout = 5;

    let listener = Listener::bind(&config.server).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ProxyServer::new(config).unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, rx).await });

    TestProxy {
        addr,
        shutdown,
        handle,
    }
}

/// Send a raw CONNECT and return the response head.
pub async fn send_connect(proxy: SocketAddr, target: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while find_head_end(&head).is_none() {
        match stream.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    (stream, String::from_utf8_lossy(&head).into_owned())
}
