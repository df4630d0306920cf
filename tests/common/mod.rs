//! Shared utilities for integration testing.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::{any, get};
use axum::Router;
use futures_util::future::BoxFuture;
use ssrf_sheriff::http::{HttpServer, Templates, TokenResponder};
use ssrf_sheriff::net::{Accepted, BoxConnection, Dialer, KeepAliveListener, Listener};
use tokio::net::TcpListener;
use tokio::time::Instant;

/// Deadline `ms` milliseconds from now.
pub fn deadline(ms: u64) -> Instant {
    Instant::now() + Duration::from_millis(ms)
}

/// A server on an OS-assigned loopback port that answers 200 to everything.
pub fn always_ok_server() -> HttpServer {
    let router = Router::new()
        .route("/", any(|| async { "ok" }))
        .route("/{*path}", any(|| async { "ok" }));
    HttpServer::new(Some("127.0.0.1:0".into()), router)
}

/// A server whose `/slow` route takes `delay` to answer.
#[allow(dead_code)]
pub fn slow_server(delay: Duration) -> HttpServer {
    let router = Router::new().route(
        "/slow",
        get(move || async move {
            tokio::time::sleep(delay).await;
            "done"
        }),
    );
    HttpServer::new(Some("127.0.0.1:0".into()), router)
}

/// The token responder on an OS-assigned loopback port.
#[allow(dead_code)]
pub fn sheriff_server(token: &str) -> HttpServer {
    let templates = Templates::default().with_token_images(token).unwrap();
    let router = TokenResponder::new(token, templates)
        .unwrap()
        .into_router(Duration::from_secs(5));
    HttpServer::new(Some("127.0.0.1:0".into()), router)
}

/// Listener that is bound but never hands out connections.
#[allow(dead_code)]
pub struct StalledListener(pub TcpListener);

impl Listener for StalledListener {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<Accepted>> {
        Box::pin(std::future::pending())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }
}

/// Listener whose accept fails with a non-retryable error.
#[allow(dead_code)]
pub struct FailingListener(pub TcpListener);

impl Listener for FailingListener {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<Accepted>> {
        Box::pin(async { Err(io::Error::new(io::ErrorKind::InvalidInput, "listener torn down")) })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }
}

/// Listener that runs out of file descriptors `failures` times before
/// accepting normally.
#[allow(dead_code)]
pub struct ExhaustedListener {
    pub inner: KeepAliveListener,
    pub failures: usize,
}

#[allow(dead_code)]
impl ExhaustedListener {
    pub fn new(inner: TcpListener, failures: usize) -> Self {
        Self {
            inner: KeepAliveListener::new(inner),
            failures,
        }
    }
}

impl Listener for ExhaustedListener {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<Accepted>> {
        if self.failures > 0 {
            self.failures -= 1;
            // EMFILE
            return Box::pin(async { Err(io::Error::from_raw_os_error(24)) });
        }
        self.inner.accept()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Dialer that fails every dial with the given error kind.
#[allow(dead_code)]
pub struct FailingDialer(pub io::ErrorKind);

impl Dialer for FailingDialer {
    fn dial(&self, _addr: SocketAddr) -> BoxFuture<'_, io::Result<BoxConnection>> {
        let kind = self.0;
        Box::pin(async move { Err(io::Error::new(kind, "injected dial failure")) })
    }
}
