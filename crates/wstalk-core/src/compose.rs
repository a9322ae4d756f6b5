//! Decorator composition: building the connection stack for one outbound
//! connection attempt.
//!
//! For a secure scheme the stack is, from the caller down:
//!
//! ```text
//! HexDumpDecorator  "TLS"   plaintext the application sends and receives
//! encryption decorator      configured as a client for `server_name`
//! HexDumpDecorator  "Wire"  ciphertext exactly as it crosses the socket
//! raw connection
//! ```
//!
//! The two trace decorators are the same code; only their labels differ, so
//! the two streams can be told apart in the diagnostic output.

use std::sync::Arc;

use crate::connection::{ConnectionError, NetworkConnection};
use crate::diagnostics::{levels, DiagnosticDelegate};
use crate::hexdump::HexDumpDecorator;

/// Diagnostic label for the trace decorator next to the socket.
pub const WIRE_LABEL: &str = "Wire";

/// Diagnostic label for the trace decorator above the encryption layer.
pub const TLS_LABEL: &str = "TLS";

/// Builds the encryption decorator of a secure connection stack.
pub trait ClientEncryption: Send + Sync {
    /// Wraps `lower` in an encryption decorator configured as a client that
    /// trusts `ca_certs` (PEM) and expects the peer to be `server_name`.
    fn configure_as_client(
        &self,
        lower: Arc<dyn NetworkConnection>,
        ca_certs: &str,
        server_name: &str,
    ) -> Result<Arc<dyn NetworkConnection>, ConnectionError>;
}

/// Produces a new connection for each outbound connection attempt.
pub trait ConnectionFactory: Send + Sync {
    /// Builds a fresh, unconnected connection stack for `scheme` targeting
    /// `server_name`.
    fn create(
        &self,
        scheme: &str,
        server_name: &str,
    ) -> Result<Arc<dyn NetworkConnection>, ConnectionError>;
}

/// Creates one raw (undecorated) connection.
pub type RawConnectionFactory = Arc<dyn Fn() -> Arc<dyn NetworkConnection> + Send + Sync>;

/// The standard [`ConnectionFactory`]: raw connection, optional hex-dump
/// tracing, and encryption for secure schemes.
pub struct DecoratedConnectionFactory {
    raw: RawConnectionFactory,
    encryption: Arc<dyn ClientEncryption>,
    ca_certs: Arc<str>,
    diagnostics: DiagnosticDelegate,
    hex_dump: bool,
    trace_level: usize,
}

impl DecoratedConnectionFactory {
    /// Creates a factory with hex-dump tracing enabled at
    /// [`levels::INFO`].
    pub fn new(
        raw: RawConnectionFactory,
        encryption: Arc<dyn ClientEncryption>,
        ca_certs: impl Into<String>,
        diagnostics: DiagnosticDelegate,
    ) -> Self {
        Self {
            raw,
            encryption,
            ca_certs: Arc::from(ca_certs.into()),
            diagnostics,
            hex_dump: true,
            trace_level: levels::INFO,
        }
    }

    /// Enables or disables the hex-dump decorators.
    pub fn with_hex_dump(mut self, enabled: bool) -> Self {
        self.hex_dump = enabled;
        self
    }

    fn traced(&self, lower: Arc<dyn NetworkConnection>, label: &str) -> Arc<dyn NetworkConnection> {
        if !self.hex_dump {
            return lower;
        }
        let delegate =
            HexDumpDecorator::labelled_delegate(Arc::clone(&self.diagnostics), label, self.trace_level);
        Arc::new(HexDumpDecorator::decorate(lower, delegate))
    }
}

impl ConnectionFactory for DecoratedConnectionFactory {
    fn create(
        &self,
        scheme: &str,
        server_name: &str,
    ) -> Result<Arc<dyn NetworkConnection>, ConnectionError> {
        let secure = is_secure_scheme(scheme)
            .ok_or_else(|| ConnectionError::UnsupportedScheme(scheme.to_string()))?;
        let wire = self.traced((self.raw)(), WIRE_LABEL);
        if !secure {
            return Ok(wire);
        }
        let encrypted = self
            .encryption
            .configure_as_client(wire, &self.ca_certs, server_name)?;
        Ok(self.traced(encrypted, TLS_LABEL))
    }
}

/// Classifies a URI scheme: `Some(true)` for TLS schemes, `Some(false)` for
/// plain ones, `None` for anything else.
pub fn is_secure_scheme(scheme: &str) -> Option<bool> {
    match scheme.to_ascii_lowercase().as_str() {
        "wss" | "https" => Some(true),
        "ws" | "http" => Some(false),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
