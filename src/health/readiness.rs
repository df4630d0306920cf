//! Readiness probing.
//!
//! # Responsibilities
//! - Decide whether an HTTP server is processing requests, without touching
//!   any application route
//! - Bound the whole conversation by one caller-supplied deadline
//!
//! # Protocol
//! ```text
//! dial → write "INVALID\n\n" → read 1 byte
//! ```
//! The request line is rejected by the server's HTTP parser before routing,
//! so the user handler never runs. Any byte back (even the start of a
//! `400 Bad Request`) proves the request-processing path is live.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

use crate::net::Dialer;

const INVALID_HTTP_REQUEST_LINE: &[u8] = b"INVALID\n\n";

/// Error type for readiness probes.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The deadline passed during dial, write or read.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("failed to dial to {addr}: {source}")]
    Dial {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to write request to server: {0}")]
    Write(#[source] io::Error),

    #[error("failed to read response from server: {0}")]
    Read(#[source] io::Error),

    #[error("failed to read response from server: connection closed")]
    ConnectionClosed,
}

impl ProbeError {
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, ProbeError::DeadlineExceeded)
    }
}

/// Connect to the HTTP server at `addr` and wait until it answers, or until
/// `deadline` passes.
pub async fn wait_until_available(
    dialer: &dyn Dialer,
    addr: SocketAddr,
    deadline: Instant,
) -> Result<(), ProbeError> {
    let mut conn = step(deadline, dialer.dial(addr), |source| ProbeError::Dial {
        addr,
        source,
    })
    .await?;

    step(
        deadline,
        conn.write_all(INVALID_HTTP_REQUEST_LINE),
        ProbeError::Write,
    )
    .await?;

    let mut out = [0u8; 1];
    let read = step(deadline, conn.read(&mut out), ProbeError::Read).await?;
    if read == 0 {
        return Err(ProbeError::ConnectionClosed);
    }

    tracing::debug!(address = %addr, "Server answered readiness probe");
    Ok(())
}

/// Run one step of the probe under the shared deadline. Timeouts from either
/// the deadline or the socket itself become [`ProbeError::DeadlineExceeded`].
async fn step<T, F>(
    deadline: Instant,
    fut: F,
    wrap: impl FnOnce(io::Error) -> ProbeError,
) -> Result<T, ProbeError>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Err(_) => Err(ProbeError::DeadlineExceeded),
        Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Err(ProbeError::DeadlineExceeded),
        Ok(Err(e)) => Err(wrap(e)),
        Ok(Ok(value)) => Ok(value),
    }
}
