//! wstalk library crate.
//!
//! An interactive WebSocket client: it connects to a server, requests an
//! upgrade to the WebSocket protocol, then sends each console line as a text
//! message and reports everything the server sends back.  Every byte that
//! crosses the connection can be traced as a hex dump, both as ciphertext
//! ("Wire") and as plaintext ("TLS").
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! console (stdin lines)
//!         ↕
//! [wstalk]
//!   ├── domain/           Pure types: ClientConfig, LifecycleState, ConnectFailure
//!   ├── application/      Lifecycle orchestrator + the traits it drives
//!   └── infrastructure/
//!         ├── network/    TCP connection and TLS decorator (rustls)
//!         ├── http/       HTTP/1.1 upgrade exchange (httparse)
//!         ├── websocket/  WebSocket session (tungstenite)
//!         └── storage/    Settings file and CA certificate loading
//!         ↕
//! WebSocket server
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `wstalk-core` only; it talks to
//!   the network through the [`application::upgrade`] traits.
//! - `infrastructure` implements those traits with `tokio`, `rustls`,
//!   `httparse` and `tungstenite`.
//!
//! # For beginners: why this structure?
//!
//! The lifecycle orchestrator decides *when* to connect, send, and close.
//! Keeping it free of sockets means the integration tests can drive every
//! state transition with hand-written doubles and no network at all.

/// Domain layer: configuration and lifecycle types (no I/O).
pub mod domain;

/// Application layer: the client lifecycle orchestrator.
pub mod application;

/// Infrastructure layer: TCP, TLS, HTTP upgrade, WebSocket, settings.
pub mod infrastructure;
