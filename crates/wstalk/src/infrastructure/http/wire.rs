//! HTTP/1.1 message text: request serialization and response-head parsing.

use std::fmt::Write;

use thiserror::Error;
use tokio_tungstenite::tungstenite::http::{header, Request, Response, StatusCode, Version};

use crate::domain::config::default_port;

/// Most headers accepted in one response head.
const MAX_HEADERS: usize = 64;

/// Errors from parsing a response head.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed response head: {0}")]
    Malformed(#[from] httparse::Error),
    #[error("invalid response: {0}")]
    Invalid(String),
}

/// A parsed response head plus where its body starts.
#[derive(Debug)]
pub struct ResponseHead {
    pub response: Response<()>,
    pub reason: String,
    /// Bytes of the buffer consumed by the head.
    pub head_len: usize,
}

impl ResponseHead {
    /// Declared body length; zero when the header is absent or unreadable.
    pub fn content_length(&self) -> usize {
        self.response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// Renders `request` as HTTP/1.1 text, adding a `Host` header when the
/// request has none.
pub fn serialize_request(request: &Request<()>) -> Vec<u8> {
    let uri = request.uri();
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| !pq.is_empty())
        .unwrap_or("/");
    let mut text = String::new();
    let _ = write!(text, "{} {} HTTP/1.1\r\n", request.method(), target);
    if !request.headers().contains_key(header::HOST) {
        if let Some(host) = uri.host() {
            let scheme = uri.scheme_str().unwrap_or_default().to_ascii_lowercase();
            match uri.port_u16() {
                Some(port) if port != default_port(&scheme) => {
                    let _ = write!(text, "Host: {host}:{port}\r\n");
                }
                _ => {
                    let _ = write!(text, "Host: {host}\r\n");
                }
            }
        }
    }
    let mut bytes = text.into_bytes();
    for (name, value) in request.headers() {
        bytes.extend_from_slice(name.as_str().as_bytes());
        bytes.extend_from_slice(b": ");
        bytes.extend_from_slice(value.as_bytes());
        bytes.extend_from_slice(b"\r\n");
    }
    bytes.extend_from_slice(b"\r\n");
    bytes
}

/// Parses a response head from the start of `buffer`.
///
/// Returns `Ok(None)` while the head is still incomplete.
pub fn parse_response_head(buffer: &[u8]) -> Result<Option<ResponseHead>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut headers);
    let head_len = match parsed.parse(buffer)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Ok(None),
    };
    let code = parsed
        .code
        .ok_or_else(|| ParseError::Invalid("missing status code".to_string()))?;
    let status =
        StatusCode::from_u16(code).map_err(|e| ParseError::Invalid(e.to_string()))?;
    let mut builder = Response::builder().status(status).version(Version::HTTP_11);
    for h in parsed.headers.iter() {
        builder = builder.header(h.name, h.value);
    }
    let response = builder
        .body(())
        .map_err(|e| ParseError::Invalid(e.to_string()))?;
    Ok(Some(ResponseHead {
        response,
        reason: parsed.reason.unwrap_or_default().to_string(),
        head_len,
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
