//! SSRF Sheriff
//!
//! Serves a secret token in whatever format the URL's extension asks for.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request     ┌──────────────────────────────────────────────┐
//!     ───────────────────┼─▶ net::listener ──▶ http::server ──▶ http::  │
//!                        │   (keep-alive)      (hyper)          responder│
//!     ◀──────────────────┼──────────────────────────────────────────────┤
//!                        │                                              │
//!                        │  lifecycle::handle                           │
//!                        │    start:    bind → serve task → readiness   │
//!                        │    shutdown: drain → reap serve task         │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::time::Instant;

use ssrf_sheriff::config::{read_config, validate_config, ConfigError, SheriffConfig};
use ssrf_sheriff::http::{HttpServer, Templates, TokenResponder};
use ssrf_sheriff::lifecycle::{shutdown_signal, Handle};
use ssrf_sheriff::observability::logging;

#[derive(Parser)]
#[command(name = "ssrf-sheriff")]
#[command(about = "Echo a secret token to confirm SSRF vulnerabilities", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/base.toml")]
    config: PathBuf,

    /// Override `http.address`.
    #[arg(short, long)]
    address: Option<String>,

    /// Override `ssrf_token`.
    #[arg(short, long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        read_config(&cli.config)?
    } else {
        SheriffConfig::default()
    };
    if let Some(address) = cli.address {
        config.http.address = address;
    }
    if let Some(token) = cli.token {
        config.ssrf_token = token;
    }

    logging::init(&config.logging.filter);
    tracing::info!("ssrf-sheriff v{} starting", env!("CARGO_PKG_VERSION"));

    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::info!(
        config_path = %cli.config.display(),
        bind_address = %config.http.address,
        templates_dir = %config.templates_dir.display(),
        "Configuration loaded"
    );

    let templates = Templates::load(&config.templates_dir).with_token_images(&config.ssrf_token)?;
    let router = TokenResponder::new(&config.ssrf_token, templates)?
        .into_router(Duration::from_secs(config.http.request_timeout_secs));

    let mut handle = Handle::new(HttpServer::new(Some(config.http.address.clone()), router));

    let startup_timeout = Duration::from_secs(config.lifecycle.startup_timeout_secs);
    handle.start(Instant::now() + startup_timeout).await?;

    if let Some(addr) = handle.addr() {
        tracing::info!(address = %addr, "Listening for connections");
    }

    shutdown_signal().await;

    let shutdown_timeout = Duration::from_secs(config.lifecycle.shutdown_timeout_secs);
    handle.shutdown(Instant::now() + shutdown_timeout).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
