//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (handle.rs):
//!     Bind listener → Spawn serve task → Readiness probe → Running
//!
//! Shutdown (handle.rs):
//!     Stop accepting → Drain connections → Reap serve task → Idle
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Start returns only once the server answers requests
//! - Shutdown has a deadline; a failed shutdown leaves the handle running
//!   so it can be retried

pub mod handle;
pub mod signals;

pub use handle::{resolve_bind_address, Handle, ShutdownError, StartError};
pub use signals::shutdown_signal;
