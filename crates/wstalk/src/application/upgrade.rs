//! Collaborator traits for the upgrade handshake.
//!
//! The orchestrator never touches sockets.  It issues the upgrade request
//! through an [`UpgradeExchange`], watches the returned [`Transaction`], and
//! hands the upgraded connection to an [`UpgradeSession`].  Infrastructure
//! implementations use `httparse` and `tungstenite`; tests use recording
//! doubles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_tungstenite::tungstenite::http::{Request, Response};
use wstalk_core::NetworkConnection;

/// Progress of an upgrade request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No complete response yet.
    InProgress,
    /// A complete response was received.
    Completed,
    /// The server could not be reached.
    UnableToConnect,
    /// The server hung up before the response was complete.
    Broken,
    /// The request timeout elapsed first.
    Timeout,
}

/// Status line of a completed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseStatus {
    pub code: u16,
    pub reason: String,
}

/// Called once, before the transaction reports `Completed`, when the server
/// answers an upgrade request with `101 Switching Protocols`.
///
/// Receives the response head, the connection it arrived on, and any bytes
/// that followed the head (the first bytes of the upgraded protocol).
pub type UpgradeDelegate =
    Box<dyn FnOnce(&Response<()>, Arc<dyn NetworkConnection>, &[u8]) + Send>;

/// Handle to one in-flight request.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Waits up to `timeout` for the transaction to leave
    /// [`TransactionState::InProgress`].  Returns `true` if it did.
    async fn await_completion(&self, timeout: Duration) -> bool;

    /// Current state.
    fn state(&self) -> TransactionState;

    /// Status of the response, once one has been received.
    fn response(&self) -> Option<ResponseStatus>;
}

/// Issues HTTP requests that may upgrade their connection.
pub trait UpgradeExchange: Send + Sync {
    /// Starts `request` and returns immediately.  `on_upgrade` runs only if
    /// the response switches protocols; any other response completes the
    /// transaction without it.
    fn request(&self, request: Request<()>, on_upgrade: UpgradeDelegate) -> Arc<dyn Transaction>;
}

/// Called with each text message received.
pub type TextDelegate = Arc<dyn Fn(&str) + Send + Sync>;

/// Called with the payload of each ping received.
pub type PingDelegate = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Called once when the session closes, with the close code and reason.
pub type CloseDelegate = Arc<dyn Fn(u16, &str) + Send + Sync>;

/// Callbacks for session events.  Missing delegates mean "ignore".
#[derive(Clone, Default)]
pub struct SessionDelegates {
    pub text: Option<TextDelegate>,
    pub ping: Option<PingDelegate>,
    pub close: Option<CloseDelegate>,
}

/// The protocol a connection is upgraded to.
pub trait UpgradeSession: Send + Sync {
    /// Adds the upgrade headers to an outgoing request.
    fn start_open_as_client(&self, request: &mut Request<()>);

    /// Validates `response` and, if it completes the upgrade, takes over
    /// `connection`.  `trailer` holds bytes that arrived after the response
    /// head.  Returns `true` when the session is engaged.
    fn finish_open_as_client(
        &self,
        connection: Arc<dyn NetworkConnection>,
        response: &Response<()>,
        trailer: &[u8],
    ) -> bool;

    /// Replaces the event callbacks.
    fn set_delegates(&self, delegates: SessionDelegates);

    /// Sends a text message.  Ignored unless engaged.
    fn send_text(&self, text: &str);

    /// Starts the close handshake with `code` and `reason`.
    fn close(&self, code: u16, reason: &str);
}
