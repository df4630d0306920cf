//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section has defaults, so a minimal config only sets the token.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the sheriff.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SheriffConfig {
    /// Secret token echoed in every response.
    pub ssrf_token: String,

    /// Directory holding response templates and media files.
    pub templates_dir: PathBuf,

    /// HTTP listener settings.
    pub http: HttpConfig,

    /// Startup and shutdown deadlines.
    pub lifecycle: LifecycleConfig,

    /// Log filtering.
    pub logging: LoggingConfig,
}

impl Default for SheriffConfig {
    fn default() -> Self {
        Self {
            ssrf_token: String::new(),
            templates_dir: PathBuf::from("templates"),
            http: HttpConfig::default(),
            lifecycle: LifecycleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address (e.g., "0.0.0.0:8000"). Empty means an OS-assigned port.
    pub address: String,

    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Lifecycle deadlines.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long startup may wait for the server to answer requests.
    pub startup_timeout_secs: u64,

    /// How long shutdown may wait for in-flight requests.
    pub shutdown_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: 10,
            shutdown_timeout_secs: 15,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "ssrf_sheriff=info,tower_http=info".to_string(),
        }
    }
}
