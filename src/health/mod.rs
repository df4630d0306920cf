//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Readiness (readiness.rs):
//!     Lifecycle handle starts a server
//!     → Dial the bound address
//!     → Send a request the HTTP parser rejects
//!     → First response byte means the server is live
//! ```
//!
//! # Design Decisions
//! - Probes never reach application routes, so they have no side effects
//! - A single deadline bounds dial, write and read

pub mod readiness;

pub use readiness::{wait_until_available, ProbeError};
