//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     listener.rs (bind, accept, keep-alive on TCP)
//!     → connection.rs (live connection tracking)
//!     → Hand off to HTTP layer
//!
//! Outbound:
//!     dialer.rs (connections opened by the readiness prober)
//! ```
//!
//! # Design Decisions
//! - Listener and dialer creation go through factory traits so the lifecycle
//!   handle can be exercised without real sockets
//! - Every accepted connection is tracked so shutdown can drain them

pub mod connection;
pub mod dialer;
pub mod listener;

pub use connection::{BoxConnection, Connection, ConnectionGuard, ConnectionId, ConnectionTracker};
pub use dialer::{tcp_dialer, Dialer, DialerFactory, TcpDialer};
pub use listener::{
    listen, Accepted, BoxListener, KeepAliveListener, Listener, ListenerFactory, KEEP_ALIVE_PERIOD,
};
