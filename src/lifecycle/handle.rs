//! Server lifecycle handle.
//!
//! # Responsibilities
//! - Bind the listener and run the server's accept loop in a background task
//! - Block `start` until the server actually answers requests
//! - Shut the server down gracefully and reap the background task
//!
//! # Design Decisions
//! - `start` waits on a readiness probe. Returning as soon as the listener is
//!   bound would let a quick `start` + `shutdown` pair race the accept loop
//!   and leave a live listener behind.
//! - The serve task reports its outcome through a oneshot channel that is
//!   consumed by the matching `shutdown`, so repeated shutdowns never block.
//! - No `start` failure leaves the listener open: either the serve task has
//!   already exited (and closed it) or the task is aborted here.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::time::Instant;

use crate::health::readiness::{wait_until_available, ProbeError};
use crate::http::Server;
use crate::net::{dialer, listener, DialerFactory, ListenerFactory};

/// Address used when the server has none configured: any interface,
/// OS-assigned port.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:0";

const NETWORK: &str = "tcp";

/// Error type for [`Handle::start`].
#[derive(Debug, Error)]
pub enum StartError {
    #[error("server is already running")]
    AlreadyRunning,

    /// The listener could not be created. Nothing was started.
    #[error("error starting HTTP server on {addr:?}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The server never answered the readiness probe.
    #[error("error waiting for server on {addr} to start up: {source}")]
    Readiness {
        addr: SocketAddr,
        #[source]
        source: ProbeError,
    },

    /// The serve loop failed before the server became ready.
    #[error("error starting HTTP server on {addr}: {source}")]
    Serve {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The server was shut down before it became ready.
    #[error("error starting HTTP server on {addr}: server closed")]
    ServerClosed { addr: SocketAddr },

    /// The serve task ended without reporting an outcome (it panicked).
    #[error("error starting HTTP server on {addr}: serve task aborted")]
    ServeAborted { addr: SocketAddr },
}

impl StartError {
    /// True when the start failed because the caller's deadline passed.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(
            self,
            StartError::Readiness {
                source: ProbeError::DeadlineExceeded,
                ..
            }
        )
    }
}

/// Error type for [`Handle::shutdown`].
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Connections were still open when the deadline passed.
    #[error("deadline exceeded while shutting down HTTP server")]
    DeadlineExceeded,

    #[error("error shutting down HTTP server: {0}")]
    Server(#[source] io::Error),

    /// The serve loop terminated with an error instead of closing.
    #[error("HTTP server terminated abnormally: {0}")]
    Serve(#[source] io::Error),

    #[error("HTTP server task aborted before reporting its outcome")]
    ServeAborted,
}

enum HandleState {
    Idle,
    Running {
        local_addr: SocketAddr,
        /// Taken by the first `shutdown` that waits on it.
        completion: Option<oneshot::Receiver<io::Result<()>>>,
    },
}

/// Clean startup and shutdown for a [`Server`].
///
/// All server lifecycle operations must go through the handle once it is
/// created; starting or stopping the server directly is not supported.
/// Lifecycle methods take `&mut self`, so calls on one handle are serialized.
///
/// ```no_run
/// # use std::time::Duration;
/// # use tokio::time::Instant;
/// # use ssrf_sheriff::http::HttpServer;
/// # use ssrf_sheriff::lifecycle::Handle;
/// # async fn run(router: axum::Router) -> Result<(), Box<dyn std::error::Error>> {
/// let mut handle = Handle::new(HttpServer::new(None, router));
/// handle.start(Instant::now() + Duration::from_secs(5)).await?;
/// println!("listening on {:?}", handle.addr());
/// handle.shutdown(Instant::now() + Duration::from_secs(5)).await?;
/// # Ok(())
/// # }
/// ```
pub struct Handle<S> {
    server: Arc<S>,
    state: HandleState,
    listener_factory: Box<dyn ListenerFactory>,
    dialer_factory: Box<dyn DialerFactory>,
}

impl<S: Server> Handle<S> {
    /// Create a handle for `server` using real TCP listeners and dialers.
    pub fn new(server: S) -> Self {
        Self::from_arc(Arc::new(server))
    }

    /// Create a handle for a server that is shared elsewhere.
    pub fn from_arc(server: Arc<S>) -> Self {
        Self {
            server,
            state: HandleState::Idle,
            listener_factory: Box::new(listener::listen),
            dialer_factory: Box::new(dialer::tcp_dialer),
        }
    }

    /// Replace how listeners are created.
    pub fn with_listener_factory(mut self, factory: impl ListenerFactory) -> Self {
        self.listener_factory = Box::new(factory);
        self
    }

    /// Replace how readiness probes dial the server.
    pub fn with_dialer_factory(mut self, factory: impl DialerFactory) -> Self {
        self.dialer_factory = Box::new(factory);
        self
    }

    pub fn server(&self) -> &Arc<S> {
        &self.server
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, HandleState::Running { .. })
    }

    /// Address the server is listening on, or `None` if it is not running.
    /// Useful when the server was started on an OS-assigned port.
    pub fn addr(&self) -> Option<SocketAddr> {
        match &self.state {
            HandleState::Running { local_addr, .. } => Some(*local_addr),
            HandleState::Idle => None,
        }
    }

    /// Start the server in a background task and wait until it is ready to
    /// process requests, or until `deadline` passes.
    ///
    /// The server binds to its configured address, defaulting to an
    /// OS-assigned port when none is set.
    pub async fn start(&mut self, deadline: Instant) -> Result<(), StartError> {
        if self.is_running() {
            return Err(StartError::AlreadyRunning);
        }

        let addr = resolve_bind_address(self.server.addr());

        // Most startup failures are bind failures, and nothing is running yet.
        let listener = self
            .listener_factory
            .listen(NETWORK, &addr)
            .await
            .map_err(|source| StartError::Listen {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| StartError::Listen { addr, source })?;

        let (done_tx, mut done_rx) = oneshot::channel();
        let serving = Arc::clone(&self.server).serve(listener);
        let serve_task = tokio::spawn(async move {
            let result = serving.await;
            if let Err(e) = &result {
                tracing::error!(address = %local_addr, error = %e, "HTTP server terminated");
            }
            let _ = done_tx.send(result);
        });

        let dialer = self.dialer_factory.new_dialer();
        if let Err(probe_err) =
            wait_until_available(dialer.as_ref(), probe_addr(local_addr), deadline).await
        {
            return Err(match done_rx.try_recv() {
                // The serve task finished first; its error says more.
                Ok(Err(source)) => StartError::Serve {
                    addr: local_addr,
                    source,
                },
                Ok(Ok(())) => StartError::ServerClosed { addr: local_addr },
                Err(TryRecvError::Closed) => StartError::ServeAborted { addr: local_addr },
                Err(TryRecvError::Empty) => {
                    // Dropping the serve future closes the listener.
                    serve_task.abort();
                    let _ = serve_task.await;
                    tracing::warn!(
                        address = %local_addr,
                        error = %probe_err,
                        "HTTP server did not become ready"
                    );
                    StartError::Readiness {
                        addr: local_addr,
                        source: probe_err,
                    }
                }
            });
        }

        tracing::info!(address = %local_addr, "HTTP server ready");
        self.state = HandleState::Running {
            local_addr,
            completion: Some(done_rx),
        };
        Ok(())
    }

    /// Gracefully shut the server down. `deadline` bounds how long in-flight
    /// connections may take to finish.
    ///
    /// The handle returns to idle only if shutdown succeeds; a failed
    /// shutdown may be retried.
    pub async fn shutdown(&mut self, deadline: Instant) -> Result<(), ShutdownError> {
        self.server.shutdown(deadline).await.map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                ShutdownError::DeadlineExceeded
            } else {
                ShutdownError::Server(e)
            }
        })?;

        if let HandleState::Running { completion, .. } = &mut self.state {
            if let Some(done) = completion.take() {
                match done.await {
                    Ok(Ok(())) => {}
                    Ok(Err(source)) => return Err(ShutdownError::Serve(source)),
                    Err(_) => return Err(ShutdownError::ServeAborted),
                }
            }
        }

        if let Some(local_addr) = self.addr() {
            tracing::info!(address = %local_addr, "HTTP server shut down");
        }
        self.state = HandleState::Idle;
        Ok(())
    }
}

/// Bind address for a server's configured address. Empty means an
/// OS-assigned port on all interfaces; a bare `:port` binds all interfaces
/// and a bare `host:` gets an OS-assigned port.
pub fn resolve_bind_address(configured: Option<&str>) -> String {
    match configured.map(str::trim) {
        None | Some("") | Some(":") => DEFAULT_BIND_ADDRESS.to_string(),
        Some(addr) if addr.starts_with(':') => format!("0.0.0.0{addr}"),
        Some(addr) if addr.ends_with(':') => format!("{addr}0"),
        Some(addr) => addr.to_string(),
    }
}

/// Address to probe for a listener bound to `local_addr`. Unspecified
/// addresses are not dialable everywhere, so probe loopback instead.
fn probe_addr(local_addr: SocketAddr) -> SocketAddr {
    match local_addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local_addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), local_addr.port())
        }
        _ => local_addr,
    }
}
