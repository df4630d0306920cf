//! Configuration loading tests.

use std::io::Write;

use ssrf_sheriff::config::{load_config, read_config, ConfigError, ValidationError};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
ssrf_token = "abc123"
templates_dir = "/srv/templates"

[http]
address = ":9000"
request_timeout_secs = 5

[lifecycle]
startup_timeout_secs = 3
shutdown_timeout_secs = 7

[logging]
filter = "debug"
"#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.ssrf_token, "abc123");
    assert_eq!(config.templates_dir.to_str(), Some("/srv/templates"));
    assert_eq!(config.http.address, ":9000");
    assert_eq!(config.http.request_timeout_secs, 5);
    assert_eq!(config.lifecycle.startup_timeout_secs, 3);
    assert_eq!(config.lifecycle.shutdown_timeout_secs, 7);
    assert_eq!(config.logging.filter, "debug");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let file = write_config("ssrf_token = \"t\"\n");

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.http.address, "127.0.0.1:8000");
    assert_eq!(config.http.request_timeout_secs, 30);
    assert_eq!(config.lifecycle.startup_timeout_secs, 10);
    assert_eq!(config.lifecycle.shutdown_timeout_secs, 15);
}

#[test]
fn test_missing_token_fails_validation() {
    let file = write_config("[http]\naddress = \"127.0.0.1:0\"\n");

    // Reading alone succeeds so overrides can fill the token in.
    assert!(read_config(file.path()).is_ok());

    match load_config(file.path()) {
        Err(ConfigError::Validation(errors)) => {
            assert_eq!(errors, vec![ValidationError::EmptyToken]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_parse_error() {
    let file = write_config("ssrf_token = [unterminated");
    assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
}

#[test]
fn test_missing_file() {
    let err = load_config(std::path::Path::new("/nonexistent/sheriff.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
    assert!(err.to_string().starts_with("IO error"));
}
