//! Infrastructure layer: everything that touches the network or the disk.
//!
//! [`build_client_stack`] wires the concrete pieces together for one run:
//!
//! ```text
//! HttpUpgradeClient ──▶ DecoratedConnectionFactory
//!                          ├── TcpConnection (raw)
//!                          ├── HexDumpDecorator "Wire"
//!                          ├── TlsDecorator (secure schemes)
//!                          └── HexDumpDecorator "TLS"
//! WebSocketSession   (engaged on the upgraded connection)
//! ```

pub mod http;
pub mod network;
pub mod storage;
pub mod websocket;

use std::sync::Arc;

use wstalk_core::{DecoratedConnectionFactory, DiagnosticsSender, Subscription};

use crate::domain::ClientConfig;

pub use http::HttpUpgradeClient;
pub use network::{tcp_connection_factory, TcpConnection, TlsClientEncryption, TlsDecorator};
pub use websocket::WebSocketSession;

/// The collaborators a [`ClientLifecycle`](crate::application::ClientLifecycle)
/// needs, already subscribed to a diagnostics sender.
pub struct ClientStack {
    pub exchange: Arc<HttpUpgradeClient>,
    pub session: Arc<WebSocketSession>,
    /// Keeps the layers' diagnostics flowing into the sender.
    pub subscription: Subscription,
}

/// Builds the exchange and session for `config`, routing every layer's
/// diagnostics (hex dumps included) into `diagnostics`.
pub fn build_client_stack(config: &ClientConfig, diagnostics: &DiagnosticsSender) -> ClientStack {
    let factory = DecoratedConnectionFactory::new(
        tcp_connection_factory(),
        Arc::new(TlsClientEncryption),
        config.ca_certs.clone(),
        diagnostics.chain(),
    )
    .with_hex_dump(config.hex_dump);

    let exchange = Arc::new(HttpUpgradeClient::new(
        Arc::new(factory),
        config.request_timeout,
    ));
    let session = Arc::new(WebSocketSession::new());
    let subscription = exchange
        .subscribe_to_diagnostics(diagnostics.chain(), config.min_level)
        .join(session.subscribe_to_diagnostics(diagnostics.chain(), config.min_level));

    ClientStack {
        exchange,
        session,
        subscription,
    }
}
