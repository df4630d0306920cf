//! Outbound connection seam used by the readiness prober.

use std::io;
use std::net::SocketAddr;

use futures_util::future::BoxFuture;
use tokio::net::TcpStream;

use super::connection::BoxConnection;

/// Opens connections to a server.
pub trait Dialer: Send + Sync {
    fn dial(&self, addr: SocketAddr) -> BoxFuture<'_, io::Result<BoxConnection>>;
}

/// Dials plain TCP connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    fn dial(&self, addr: SocketAddr) -> BoxFuture<'_, io::Result<BoxConnection>> {
        Box::pin(async move {
            let stream = TcpStream::connect(addr).await?;
            Ok(Box::new(stream) as BoxConnection)
        })
    }
}

/// Builds a fresh [`Dialer`] for each readiness probe.
pub trait DialerFactory: Send + Sync + 'static {
    fn new_dialer(&self) -> Box<dyn Dialer>;
}

impl<F> DialerFactory for F
where
    F: Fn() -> Box<dyn Dialer> + Send + Sync + 'static,
{
    fn new_dialer(&self) -> Box<dyn Dialer> {
        self()
    }
}

/// Default dialer factory.
pub fn tcp_dialer() -> Box<dyn Dialer> {
    Box::new(TcpDialer)
}
