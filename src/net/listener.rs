//! Listeners handed to the HTTP server.
//!
//! # Responsibilities
//! - Bind to the requested network and address
//! - Enable TCP keep-alive on every accepted TCP stream so dead peers are reaped
//! - Provide the listener factory seam used by the lifecycle handle

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::future::BoxFuture;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream};

use super::connection::BoxConnection;

/// Keep-alive period applied to every accepted TCP connection.
pub const KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(3 * 60);

/// An accepted stream and, for IP transports, the peer's address.
pub type Accepted = (BoxConnection, Option<SocketAddr>);

/// A source of inbound connections.
pub trait Listener: Send + 'static {
    /// Accept the next inbound connection.
    fn accept(&mut self) -> BoxFuture<'_, io::Result<Accepted>>;

    /// Address the listener is bound to. Listeners without an IP address
    /// return `ErrorKind::Unsupported`.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Type-erased listener handed to a server.
pub type BoxListener = Box<dyn Listener>;

impl Listener for TcpListener {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<Accepted>> {
        Box::pin(async move {
            let (stream, peer_addr) = TcpListener::accept(self).await?;
            Ok((Box::new(stream) as BoxConnection, Some(peer_addr)))
        })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

#[cfg(unix)]
impl Listener for tokio::net::UnixListener {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<Accepted>> {
        Box::pin(async move {
            let (stream, _) = tokio::net::UnixListener::accept(self).await?;
            Ok((Box::new(stream) as BoxConnection, None))
        })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix listener has no IP address",
        ))
    }
}

/// Listener that turns on TCP keep-alive for each accepted stream.
///
/// A server driven from a caller-supplied listener does not set keep-alive on
/// its own, so clients that vanish mid-connection would otherwise pin server
/// resources indefinitely.
#[derive(Debug)]
pub struct KeepAliveListener {
    inner: TcpListener,
}

impl KeepAliveListener {
    pub fn new(inner: TcpListener) -> Self {
        Self { inner }
    }

    /// Accept the next stream with keep-alive enabled. Failing to set the
    /// option is logged and the stream is returned anyway.
    pub async fn accept_tcp(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer_addr) = self.inner.accept().await?;

        if let Err(e) = set_keepalive(&stream) {
            tracing::warn!(
                peer_addr = %peer_addr,
                error = %e,
                "Failed to enable TCP keep-alive"
            );
        }

        Ok((stream, peer_addr))
    }
}

impl Listener for KeepAliveListener {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<Accepted>> {
        Box::pin(async move {
            let (stream, peer_addr) = self.accept_tcp().await?;
            Ok((Box::new(stream) as BoxConnection, Some(peer_addr)))
        })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

fn set_keepalive(stream: &TcpStream) -> io::Result<()> {
    let keepalive = TcpKeepalive::new().with_time(KEEP_ALIVE_PERIOD);
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "macos",
        target_os = "ios",
        target_os = "windows"
    ))]
    let keepalive = keepalive.with_interval(KEEP_ALIVE_PERIOD);

    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

/// Creates listeners from a `(network, address)` pair.
///
/// Implemented for any `Fn(String, String) -> impl Future<Output =
/// io::Result<BoxListener>>`, so tests can swap in a closure.
pub trait ListenerFactory: Send + Sync + 'static {
    fn listen(&self, network: &str, address: &str) -> BoxFuture<'static, io::Result<BoxListener>>;
}

impl<F, Fut> ListenerFactory for F
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = io::Result<BoxListener>> + Send + 'static,
{
    fn listen(&self, network: &str, address: &str) -> BoxFuture<'static, io::Result<BoxListener>> {
        Box::pin(self(network.to_owned(), address.to_owned()))
    }
}

/// Default listener factory. TCP listeners are wrapped in a
/// [`KeepAliveListener`]; unix socket listeners are returned as-is.
pub async fn listen(network: String, address: String) -> io::Result<BoxListener> {
    match network.as_str() {
        "tcp" | "tcp4" | "tcp6" => {
            let listener = TcpListener::bind(address.as_str()).await?;

            tracing::debug!(
                address = %address,
                local_addr = ?listener.local_addr().ok(),
                "Listener bound"
            );

            Ok(Box::new(KeepAliveListener::new(listener)))
        }
        #[cfg(unix)]
        "unix" => {
            let listener = tokio::net::UnixListener::bind(address.as_str())?;
            tracing::debug!(path = %address, "Unix listener bound");
            Ok(Box::new(listener))
        }
        other => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unsupported network {other:?}"),
        )),
    }
}
