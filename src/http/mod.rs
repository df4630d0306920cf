//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Connection (from a net::Listener)
//!     → server.rs (hyper HTTP/1.1 + HTTP/2, connection draining)
//!     → responder.rs (token echo, format by extension)
//!         images.rs renders the token for .png/.jpg bodies at startup
//!     → Send to client
//! ```

pub mod images;
pub mod responder;
pub mod server;

pub use responder::{Templates, TokenResponder, X_SECRET_TOKEN};
pub use server::{HttpServer, Server};
