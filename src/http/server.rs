//! HTTP server driven by the lifecycle handle.
//!
//! # Responsibilities
//! - Define the `Server` contract the lifecycle handle starts and stops
//! - Serve HTTP/1.1 and HTTP/2 on a caller-supplied listener
//! - Track live connections and drain them on shutdown
//!
//! # Design Decisions
//! - `serve` returning `Ok(())` means the server was closed on purpose;
//!   any `Err` is an abnormal termination
//! - `shutdown` stops the accept loop, asks every connection to finish its
//!   in-flight requests, and waits for them up to a deadline
//! - Running out of descriptors or buffers while accepting is temporary: the
//!   loop backs off (5ms doubling to 1s) and keeps accepting

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::sync::watch;
use tokio::time::Instant;
use tower::ServiceExt;

use crate::net::{BoxConnection, BoxListener, ConnectionTracker};

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(5);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// A request-serving entity whose lifecycle is managed externally.
pub trait Server: Send + Sync + 'static {
    /// Configured bind address, if any.
    fn addr(&self) -> Option<&str>;

    /// Accept and serve connections from `listener` until the server is shut
    /// down (`Ok(())`) or accepting fails (`Err`). The listener is closed
    /// before the returned future resolves.
    ///
    /// A `shutdown` issued after this call stops the returned future even if
    /// it has not been polled yet.
    fn serve(
        self: Arc<Self>,
        listener: BoxListener,
    ) -> impl Future<Output = io::Result<()>> + Send + 'static;

    /// Stop accepting and wait for in-flight connections to finish, up to
    /// `deadline`. Running out of time yields an `ErrorKind::TimedOut` error.
    fn shutdown(&self, deadline: Instant) -> impl Future<Output = io::Result<()>> + Send + '_;
}

/// Production [`Server`] backed by hyper and an axum [`Router`].
pub struct HttpServer {
    addr: Option<String>,
    router: Router,
    closing: watch::Sender<bool>,
    connections: ConnectionTracker,
}

impl HttpServer {
    /// Create a server for `router`. `addr` of `None` (or empty) lets the OS
    /// pick a port when started through a lifecycle handle.
    pub fn new(addr: Option<String>, router: Router) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            addr,
            router,
            closing,
            connections: ConnectionTracker::new(),
        }
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.connections.active_count()
    }

    fn spawn_connection(&self, stream: BoxConnection, peer_addr: Option<SocketAddr>) {
        let guard = self.connections.track();
        let mut closing = self.closing.subscribe();

        let service = self
            .router
            .clone()
            .map_request(move |mut request: Request<Incoming>| {
                if let Some(peer_addr) = peer_addr {
                    request.extensions_mut().insert(ConnectInfo(peer_addr));
                }
                request
            });
        let service = TowerToHyperService::new(service);

        tokio::spawn(async move {
            tracing::trace!(connection_id = %guard.id(), peer_addr = ?peer_addr, "Connection opened");

            let builder = auto::Builder::new(TokioExecutor::new());
            let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = closed(&mut closing) => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };

            if let Err(e) = result {
                tracing::debug!(connection_id = %guard.id(), error = %e, "Connection error");
            }
            drop(guard);
        });
    }
}

impl Server for HttpServer {
    fn addr(&self) -> Option<&str> {
        self.addr.as_deref()
    }

    fn serve(
        self: Arc<Self>,
        mut listener: BoxListener,
    ) -> impl Future<Output = io::Result<()>> + Send + 'static {
        // Reopen when called rather than when first polled, so a shutdown
        // issued after this call is never lost.
        self.closing.send_replace(false);
        let mut closing = self.closing.subscribe();

        async move {
            let local_addr = listener.local_addr().ok();
            tracing::info!(address = ?local_addr, "HTTP server starting");

            let mut backoff: Option<Duration> = None;
            loop {
                // Closing wins over a ready accept so nothing is spawned
                // after shutdown has started draining.
                tokio::select! {
                    biased;
                    _ = closed(&mut closing) => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer_addr)) => {
                            backoff = None;
                            self.spawn_connection(stream, peer_addr);
                        }
                        Err(e) if is_connection_error(&e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                        }
                        Err(e) if is_resource_exhausted(&e) => {
                            let delay = next_backoff(backoff);
                            backoff = Some(delay);
                            tracing::warn!(
                                error = %e,
                                retry_in_ms = delay.as_millis() as u64,
                                "Accept failed, retrying"
                            );
                            tokio::select! {
                                biased;
                                _ = closed(&mut closing) => break,
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        Err(e) => {
                            tracing::error!(address = ?local_addr, error = %e, "Accept loop failed");
                            return Err(e);
                        }
                    },
                }
            }

            drop(listener);
            tracing::info!(address = ?local_addr, "HTTP server stopped accepting");
            Ok(())
        }
    }

    fn shutdown(&self, deadline: Instant) -> impl Future<Output = io::Result<()>> + Send + '_ {
        async move {
            self.closing.send_replace(true);

            match tokio::time::timeout_at(deadline, self.connections.wait_idle()).await {
                Ok(()) => Ok(()),
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "{} connection(s) still active at shutdown deadline",
                        self.connections.active_count()
                    ),
                )),
            }
        }
    }
}

/// Resolves once the closing flag is set.
async fn closed(closing: &mut watch::Receiver<bool>) {
    while !*closing.borrow_and_update() {
        if closing.changed().await.is_err() {
            return;
        }
    }
}

fn next_backoff(previous: Option<Duration>) -> Duration {
    match previous {
        None => MIN_ACCEPT_BACKOFF,
        Some(delay) => (delay * 2).min(MAX_ACCEPT_BACKOFF),
    }
}

/// Errors that concern a single inbound connection rather than the listener.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

/// Errors that clear up once descriptors or buffers are released.
fn is_resource_exhausted(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::OutOfMemory {
        return true;
    }
    #[cfg(unix)]
    {
        const ENFILE: i32 = 23;
        const EMFILE: i32 = 24;
        #[cfg(any(target_os = "linux", target_os = "android"))]
        const ENOBUFS: i32 = 105;
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        const ENOBUFS: i32 = 55;

        if let Some(code) = e.raw_os_error() {
            return matches!(code, ENFILE | EMFILE | ENOBUFS);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{listen, Accepted, KeepAliveListener, Listener};
    use axum::routing::get;
    use futures_util::future::BoxFuture;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn server() -> Arc<HttpServer> {
        let router = Router::new().route("/", get(|| async { "ok" }));
        Arc::new(HttpServer::new(None, router))
    }

    async fn bound() -> (BoxListener, SocketAddr) {
        let listener = listen("tcp".into(), "127.0.0.1:0".into()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    fn deadline(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    /// Fails the first `failures` accepts with EMFILE, then accepts normally.
    struct ExhaustedListener {
        inner: KeepAliveListener,
        failures: usize,
    }

    impl Listener for ExhaustedListener {
        fn accept(&mut self) -> BoxFuture<'_, io::Result<Accepted>> {
            if self.failures > 0 {
                self.failures -= 1;
                return Box::pin(async { Err(io::Error::from_raw_os_error(24)) });
            }
            self.inner.accept()
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            self.inner.local_addr()
        }
    }

    #[test]
    fn backoff_doubles_up_to_a_cap() {
        assert_eq!(next_backoff(None), Duration::from_millis(5));
        assert_eq!(next_backoff(Some(Duration::from_millis(5))), Duration::from_millis(10));
        assert_eq!(next_backoff(Some(Duration::from_millis(800))), Duration::from_secs(1));
        assert_eq!(next_backoff(Some(Duration::from_secs(1))), Duration::from_secs(1));
    }

    #[test]
    fn classifies_accept_errors() {
        assert!(is_resource_exhausted(&io::Error::from(io::ErrorKind::OutOfMemory)));
        #[cfg(unix)]
        {
            assert!(is_resource_exhausted(&io::Error::from_raw_os_error(24)));
            assert!(is_resource_exhausted(&io::Error::from_raw_os_error(23)));
        }
        assert!(!is_resource_exhausted(&io::Error::from(io::ErrorKind::InvalidInput)));
        assert!(is_connection_error(&io::Error::from(io::ErrorKind::ConnectionAborted)));
    }

    #[tokio::test]
    async fn invalid_request_line_gets_a_response() {
        let server = server();
        let (listener, addr) = bound().await;
        let serving = tokio::spawn(Arc::clone(&server).serve(listener));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"INVALID\n\n").await.unwrap();
        let mut status_line = [0u8; 12];
        stream.read_exact(&mut status_line).await.unwrap();
        assert_eq!(&status_line, b"HTTP/1.1 400");

        server.shutdown(deadline(1_000)).await.unwrap();
        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn serve_returns_ok_after_shutdown_and_releases_the_port() {
        let server = server();
        let (listener, addr) = bound().await;
        let serving = tokio::spawn(Arc::clone(&server).serve(listener));

        server.shutdown(deadline(1_000)).await.unwrap();
        serving.await.unwrap().unwrap();

        TcpListener::bind(addr).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn keeps_accepting_after_descriptor_exhaustion() {
        let server = server();
        let inner = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = inner.local_addr().unwrap();
        let listener = ExhaustedListener {
            inner: KeepAliveListener::new(inner),
            failures: 3,
        };
        let serving = tokio::spawn(Arc::clone(&server).serve(Box::new(listener)));

        let body = reqwest::get(format!("http://{addr}/"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");
        assert!(!serving.is_finished());

        server.shutdown(deadline(2_000)).await.unwrap();
        serving.await.unwrap().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn serves_unix_listeners() {
        let server = server();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheriff.sock");
        let listener = listen("unix".into(), path.display().to_string())
            .await
            .unwrap();
        let serving = tokio::spawn(Arc::clone(&server).serve(listener));

        let mut stream = tokio::net::UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: sheriff\r\nConnection: close\r\n\r\n").await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("ok"));

        server.shutdown(deadline(1_000)).await.unwrap();
        serving.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn server_can_be_served_again() {
        let server = server();

        for _ in 0..2 {
            let (listener, addr) = bound().await;
            let serving = tokio::spawn(Arc::clone(&server).serve(listener));

            let body = reqwest::get(format!("http://{addr}/"))
                .await
                .unwrap()
                .text()
                .await
                .unwrap();
            assert_eq!(body, "ok");

            server.shutdown(deadline(2_000)).await.unwrap();
            serving.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn shutdown_times_out_on_stuck_connection() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "done"
            }),
        );
        let server = Arc::new(HttpServer::new(None, router));
        let (listener, addr) = bound().await;
        let serving = tokio::spawn(Arc::clone(&server).serve(listener));

        let request = tokio::spawn(reqwest::get(format!("http://{addr}/slow")));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(server.active_connections(), 1);

        let err = server.shutdown(deadline(100)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        // The in-flight request still completes.
        let response = request.await.unwrap().unwrap();
        assert_eq!(response.text().await.unwrap(), "done");

        server.shutdown(deadline(2_000)).await.unwrap();
        serving.await.unwrap().unwrap();
        assert_eq!(server.active_connections(), 0);
    }
}
