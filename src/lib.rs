//! SSRF Sheriff
//!
//! An HTTP service that answers every request with a configured secret token,
//! formatted to match the requested file extension, for confirming SSRF
//! vulnerabilities. The [`lifecycle::Handle`] starts the server in the
//! background, waits until it actually answers requests and shuts it down
//! gracefully.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::SheriffConfig;
pub use http::{HttpServer, Server, TokenResponder};
pub use lifecycle::Handle;
