//! Client configuration types.
//!
//! [`ClientConfig`] is the single source of truth for all runtime settings.
//! The binary builds it from the command line and the optional settings
//! file; tests build it directly.

use std::time::Duration;

use tokio_tungstenite::tungstenite::http::Uri;
use wstalk_core::levels;

/// Port used when a `wss://` or `https://` URL does not name one.
pub const DEFAULT_SECURE_PORT: u16 = 443;

/// Port used when a `ws://` or `http://` URL does not name one.
pub const DEFAULT_PLAIN_PORT: u16 = 80;

/// All runtime configuration for one wstalk session.
///
/// # Example
///
/// ```rust
/// use wstalk::domain::ClientConfig;
///
/// let cfg = ClientConfig::new("wss://echo.example.com/chat".parse().unwrap());
/// assert_eq!(cfg.port(), 443);
/// assert_eq!(cfg.host(), "echo.example.com");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// URL of the WebSocket endpoint.
    pub url: Uri,

    /// Trusted CA certificates (PEM), already concatenated.
    pub ca_certs: String,

    /// How long one wait for the upgrade transaction lasts before the
    /// shutdown flag is checked again.
    pub request_poll_interval: Duration,

    /// Upper bound on the whole upgrade exchange; after this the
    /// transaction reports a timeout.
    pub request_timeout: Duration,

    /// How long to wait for the server to acknowledge our close frame.
    pub close_timeout: Duration,

    /// How often the interactive loop wakes to check the shutdown flag while
    /// no console input arrives.
    pub input_poll_interval: Duration,

    /// Whether to stack hex-dump decorators around the connection.
    pub hex_dump: bool,

    /// Lowest diagnostics level published to the log.
    pub min_level: usize,
}

impl ClientConfig {
    /// Builds a configuration for `url` with every other setting at its
    /// default.
    ///
    /// | Field                  | Default     |
    /// |------------------------|-------------|
    /// | request_poll_interval  | 5 seconds   |
    /// | request_timeout        | 30 seconds  |
    /// | close_timeout          | 1 second    |
    /// | input_poll_interval    | 200 ms      |
    /// | hex_dump               | `true`      |
    /// | min_level              | `DEBUG` (0) |
    pub fn new(url: Uri) -> Self {
        Self {
            url,
            ca_certs: String::new(),
            request_poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(1),
            input_poll_interval: Duration::from_millis(200),
            hex_dump: true,
            min_level: levels::DEBUG,
        }
    }

    /// The URL scheme, lowercased; empty when the URL has none.
    pub fn scheme(&self) -> String {
        self.url
            .scheme_str()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default()
    }

    /// The server host name (also used as the TLS server name).
    pub fn host(&self) -> &str {
        self.url.host().unwrap_or_default()
    }

    /// The explicit port, or the scheme's default.
    pub fn port(&self) -> u16 {
        self.url.port_u16().unwrap_or_else(|| default_port(&self.scheme()))
    }
}

/// Default port for a URL scheme.
pub fn default_port(scheme: &str) -> u16 {
    match scheme {
        "ws" | "http" => DEFAULT_PLAIN_PORT,
        _ => DEFAULT_SECURE_PORT,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
