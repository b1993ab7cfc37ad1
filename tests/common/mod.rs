//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http_multiplexer::config::MuxConfig;
use http_multiplexer::lifecycle::{LifecycleError, LifecycleManager, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What a mock backend answers with.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub body: String,
}

impl MockReply {
    pub fn ok(content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type),
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }
}

/// Start a mock backend on an ephemeral port that always returns `reply`.
pub async fn start_mock_backend(reply: MockReply) -> SocketAddr {
    start_programmable_backend(move || {
        let reply = reply.clone();
        async move { reply }
    })
    .await
}

/// Start a mock backend that answers after `delay`.
pub async fn start_slow_backend(delay: Duration, reply: MockReply) -> SocketAddr {
    start_programmable_backend(move || {
        let reply = reply.clone();
        async move {
            tokio::time::sleep(delay).await;
            reply
        }
    })
    .await
}

/// Start a programmable mock backend with async support.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockReply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        if read_request_head(&mut socket).await.is_err() {
                            return;
                        }
                        let reply = f().await;
                        let content_type = reply
                            .content_type
                            .map(|ct| format!("Content-Type: {ct}\r\n"))
                            .unwrap_or_default();
                        let response = format!(
                            "HTTP/1.1 {} Mock\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                            reply.status,
                            content_type,
                            reply.body.len(),
                            reply.body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Read until the end of the request headers; outbound calls carry no body.
async fn read_request_head(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            return Ok(());
        }
    }
}

/// Start a backend that reads the request and never answers.
///
/// The returned counter goes up each time a caller closes its connection.
pub async fn start_hanging_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let closed = Arc::new(AtomicUsize::new(0));
    let counter = closed.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                if read_request_head(&mut socket).await.is_err() {
                    return;
                }
                let mut buf = [0u8; 256];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => continue,
                    }
                }
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    (addr, closed)
}

/// Encode a complete `POST /api/mux` by hand, for tests that drive raw sockets.
pub fn raw_mux_request(body: &str) -> String {
    format!(
        "POST /api/mux HTTP/1.1\r\nHost: mux\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Config with small budgets suitable for tests.
pub fn test_config() -> MuxConfig {
    let mut config = MuxConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.concurrency.max_inbound_connections = 4;
    config.concurrency.max_targets_per_request = 5;
    config.concurrency.max_outbound_per_request = 2;
    config.timeouts.target_timeout_ms = 500;
    config.timeouts.request_timeout_ms = 2_000;
    config.shutdown.drain_timeout_secs = 2;
    config
}

/// A running multiplexer on an ephemeral port.
pub struct RunningMux {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), LifecycleError>>,
}

impl RunningMux {
    pub fn mux_url(&self) -> String {
        format!("http://{}/api/mux", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_mux(config: MuxConfig) -> RunningMux {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let manager = LifecycleManager::new(config).unwrap();
    let handle = tokio::spawn(manager.serve(listener, rx));
    RunningMux {
        addr,
        shutdown,
        handle,
    }
}

/// A client that does not reuse connections between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
