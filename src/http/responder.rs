//! Secret token responder.
//!
//! # Responsibilities
//! - Answer every path with the configured token
//! - Pick the body format and content type from the path's file extension
//! - Tag every response with an `X-Secret-Token` header
//! - Log each inbound request with its peer address and headers
//!
//! # Formats
//! ```text
//! .json          → {"token":"<token>"}
//! .xml           → <SerializableResponse><token>..</token></SerializableResponse>
//! .html .csv     → template with {{token}} substituted
//! .txt           → token=<token>
//! .png .jpg .jpeg → the token rendered as an image (see `images`)
//! .gif .mp3 .mp4 → media file from the templates dir
//! anything else  → <token>
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use serde::Serialize;
use tower_http::{set_header::SetResponseHeaderLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::images;

pub const X_SECRET_TOKEN: HeaderName = HeaderName::from_static("x-secret-token");

const TOKEN_PLACEHOLDER: &str = "{{token}}";

const DEFAULT_HTML_TEMPLATE: &str =
    "<!DOCTYPE html>\n<html>\n<head><title>{{token}}</title></head>\n<body>{{token}}</body>\n</html>\n";

const DEFAULT_CSV_TEMPLATE: &str = "token\n{{token}}\n";

/// Media formats served verbatim from the templates directory, keyed by
/// extension.
const MEDIA_FILES: &[(&str, &str)] = &[
    (".gif", "gif.gif"),
    (".png", "png.png"),
    (".jpg", "jpeg.jpg"),
    (".jpeg", "jpeg.jpg"),
    (".mp3", "mp3.mp3"),
    (".mp4", "mp4.mp4"),
];

#[derive(Serialize)]
struct TokenBody<'a> {
    token: &'a str,
}

/// Response templates, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Templates {
    html: String,
    csv: String,
    media: HashMap<&'static str, Vec<u8>>,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            html: DEFAULT_HTML_TEMPLATE.to_string(),
            csv: DEFAULT_CSV_TEMPLATE.to_string(),
            media: HashMap::new(),
        }
    }
}

impl Templates {
    /// Load templates from `dir`. Missing text templates fall back to the
    /// built-in ones; missing media files are served as empty bodies.
    pub fn load(dir: &Path) -> Self {
        let mut templates = Self::default();

        if let Some(html) = read_template(dir, "html.html") {
            templates.html = String::from_utf8_lossy(&html).into_owned();
        }
        if let Some(csv) = read_template(dir, "csv.csv") {
            templates.csv = String::from_utf8_lossy(&csv).into_owned();
        }
        for &(extension, file) in MEDIA_FILES {
            if let Some(bytes) = read_template(dir, file) {
                templates.media.insert(extension, bytes);
            }
        }

        tracing::info!(
            templates_dir = %dir.display(),
            media_files = templates.media.len(),
            "Templates loaded"
        );
        templates
    }

    /// Render `token` into the PNG and JPEG bodies, replacing any loaded
    /// from disk.
    pub fn with_token_images(mut self, token: &str) -> Result<Self, image::ImageError> {
        let rendered = images::render(token)?;
        tracing::info!(
            png_bytes = rendered.png.len(),
            jpeg_bytes = rendered.jpeg.len(),
            "Token images rendered"
        );

        self.media.insert(".png", rendered.png);
        self.media.insert(".jpg", rendered.jpeg.clone());
        self.media.insert(".jpeg", rendered.jpeg);
        Ok(self)
    }
}

fn read_template(dir: &Path, name: &str) -> Option<Vec<u8>> {
    let path = dir.join(name);
    match std::fs::read(&path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Template not loaded");
            None
        }
    }
}

/// Serves the secret token in the format the request path asks for.
#[derive(Clone)]
pub struct TokenResponder {
    token: Arc<str>,
    header_value: HeaderValue,
    templates: Arc<Templates>,
}

impl TokenResponder {
    /// Fails if `token` cannot be sent as a header value.
    pub fn new(token: &str, templates: Templates) -> Result<Self, header::InvalidHeaderValue> {
        let header_value = HeaderValue::from_str(token)?;
        Ok(Self {
            token: Arc::from(token),
            header_value,
            templates: Arc::new(templates),
        })
    }

    /// Build the router answering every path.
    pub fn into_router(self, request_timeout: Duration) -> Router {
        let header_value = self.header_value.clone();
        Router::new()
            .route("/{*path}", any(respond))
            .route("/", any(respond))
            .with_state(self)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                request_timeout,
            ))
            .layer(SetResponseHeaderLayer::overriding(X_SECRET_TOKEN, header_value))
            .layer(TraceLayer::new_for_http())
    }

    /// Body and content type for a request path.
    pub fn render(&self, path: &str) -> (&'static str, Vec<u8>) {
        let extension = extension(path);
        let token = &*self.token;

        let body = match extension {
            ".json" => serde_json::to_vec(&TokenBody { token }).unwrap_or_default(),
            ".xml" => format!(
                "<SerializableResponse><token>{}</token></SerializableResponse>",
                escape_xml(token)
            )
            .into_bytes(),
            ".html" => self.templates.html.replace(TOKEN_PLACEHOLDER, token).into_bytes(),
            ".csv" => self.templates.csv.replace(TOKEN_PLACEHOLDER, token).into_bytes(),
            ".txt" => format!("token={token}").into_bytes(),
            ".gif" | ".png" | ".jpg" | ".jpeg" | ".mp3" | ".mp4" => self
                .templates
                .media
                .get(extension)
                .cloned()
                .unwrap_or_default(),
            _ => token.as_bytes().to_vec(),
        };

        (content_type(extension), body)
    }
}

async fn respond(State(responder): State<TokenResponder>, request: Request) -> Response {
    let path = request.uri().path();
    let (content_type, body) = responder.render(path);

    let peer_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    tracing::info!(
        peer_addr = ?peer_addr,
        method = %request.method(),
        path = %path,
        content_type = content_type,
        headers = ?request.headers(),
        "New inbound HTTP request"
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(body),
    )
        .into_response()
}

/// Extension of the last path segment, including the dot.
fn extension(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(i) => &name[i..],
        None => "",
    }
}

fn content_type(extension: &str) -> &'static str {
    match extension {
        ".json" => "application/json",
        ".xml" => "text/xml; charset=utf-8",
        ".html" | ".htm" => "text/html; charset=utf-8",
        ".csv" => "text/csv; charset=utf-8",
        ".txt" => "text/plain; charset=utf-8",
        ".css" => "text/css; charset=utf-8",
        ".js" | ".mjs" => "text/javascript; charset=utf-8",
        ".svg" => "image/svg+xml",
        ".gif" => "image/gif",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".webp" => "image/webp",
        ".mp3" => "audio/mpeg",
        ".mp4" => "video/mp4",
        ".pdf" => "application/pdf",
        ".wasm" => "application/wasm",
        _ => "text/plain",
    }
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
