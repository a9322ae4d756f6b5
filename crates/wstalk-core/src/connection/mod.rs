//! The network connection capability trait.
//!
//! [`NetworkConnection`] is the one interface every layer of the connection
//! stack implements: the raw TCP connection, the TLS decorator, and the
//! hex-dump decorators.  A decorator is a drop-in substitute for the
//! connection it wraps.
//!
//! # Delivery model
//!
//! Received data is pushed, not pulled.  After a successful
//! [`NetworkConnection::connect`], the owner calls
//! [`NetworkConnection::process`] once with two delegates:
//!
//! - `on_message(bytes)` is called for every chunk of received data, in
//!   order, from the connection's reader task.
//! - `on_broken(graceful)` is called once when the connection ends.
//!   `graceful` is `true` when the peer closed its end cleanly.
//!
//! Delegates may run on a different thread than the caller of `process`,
//! which is why the trait requires `Send + Sync`.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::diagnostics::{DiagnosticDelegate, Subscription};

/// Called with every chunk of data received on a connection.
pub type MessageReceivedDelegate = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Called once when a connection is broken; the flag tells whether the peer
/// closed gracefully.
pub type BrokenDelegate = Arc<dyn Fn(bool) + Send + Sync>;

/// Errors surfaced by connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The TCP connection to the peer could not be established.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// An operation that needs a live connection was called before
    /// `connect` succeeded or after the connection was closed.
    #[error("connection is not established")]
    NotConnected,
    /// `process` was called a second time on a connection that only
    /// supports a single reader.
    #[error("connection is already being processed")]
    AlreadyProcessing,
    /// The connection factory was asked for a scheme it cannot build.
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),
    /// The encryption layer could not be configured or failed.
    #[error("encryption layer error: {0}")]
    Encryption(String),
}

/// The capability set shared by raw connections and their decorators.
#[async_trait]
pub trait NetworkConnection: Send + Sync {
    /// Subscribes `delegate` to diagnostic lines at or above `min_level`
    /// published by this connection (and any layers beneath it).
    fn subscribe_to_diagnostics(
        &self,
        delegate: DiagnosticDelegate,
        min_level: usize,
    ) -> Subscription;

    /// Opens the connection to `peer`.
    async fn connect(&self, peer: SocketAddr) -> Result<(), ConnectionError>;

    /// Starts delivering received data to `on_message` and the end of the
    /// connection to `on_broken`.
    fn process(
        &self,
        on_message: MessageReceivedDelegate,
        on_broken: BrokenDelegate,
    ) -> Result<(), ConnectionError>;

    /// Address of the remote peer, or the unspecified address when not
    /// connected.
    fn peer_address(&self) -> IpAddr;

    /// Port of the remote peer, or 0 when not connected.
    fn peer_port(&self) -> u16;

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool;

    /// Local address the connection is bound to.
    fn bound_address(&self) -> IpAddr;

    /// Local port the connection is bound to.
    fn bound_port(&self) -> u16;

    /// Queues `message` for transmission.  Silently dropped when the
    /// connection is not open.
    fn send_message(&self, message: &[u8]);

    /// Closes the connection.  A clean close flushes queued data and shuts
    /// down the write direction, leaving the read direction open until the
    /// peer closes; an unclean close drops everything immediately.
    fn close(&self, clean: bool);
}
