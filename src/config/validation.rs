//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, address shape)
//! - Check the token can travel in a response header
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SheriffConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::SheriffConfig;
use crate::lifecycle::resolve_bind_address;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("ssrf_token must not be empty")]
    EmptyToken,

    #[error("ssrf_token must be a valid HTTP header value")]
    InvalidToken,

    #[error("http.address {0:?} is not a valid host:port")]
    InvalidAddress(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &SheriffConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.ssrf_token.is_empty() {
        errors.push(ValidationError::EmptyToken);
    } else if HeaderValue::from_str(&config.ssrf_token).is_err() {
        errors.push(ValidationError::InvalidToken);
    }

    if !is_valid_address(&config.http.address) {
        errors.push(ValidationError::InvalidAddress(config.http.address.clone()));
    }

    let timeouts = [
        ("http.request_timeout_secs", config.http.request_timeout_secs),
        ("lifecycle.startup_timeout_secs", config.lifecycle.startup_timeout_secs),
        ("lifecycle.shutdown_timeout_secs", config.lifecycle.shutdown_timeout_secs),
    ];
    for (name, value) in timeouts {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Accepts socket addresses and `host:port` pairs with a numeric port.
fn is_valid_address(address: &str) -> bool {
    let resolved = resolve_bind_address(Some(address));
    if resolved.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match resolved.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
