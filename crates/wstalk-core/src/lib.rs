//! # wstalk-core
//!
//! Shared library for wstalk containing the network connection capability
//! trait, the diagnostics publisher, and the decorators that can be stacked
//! on top of any connection.
//!
//! This crate has no dependencies on sockets, TLS engines, or an async
//! runtime.  Concrete connections (TCP) and the TLS decorator live in the
//! `wstalk` crate's infrastructure layer.
//!
//! # Architecture overview (for beginners)
//!
//! A *connection* is anything implementing [`NetworkConnection`]: it can
//! connect to a peer, deliver received bytes to a callback, send bytes, and
//! close.  A *decorator* is a connection that wraps another connection and
//! forwards every call to it, adding behaviour on the way through.
//!
//! ```text
//! caller
//!   └─ HexDumpDecorator ("TLS")    traces plaintext
//!        └─ TLS decorator          encrypts / decrypts
//!             └─ HexDumpDecorator ("Wire")  traces ciphertext
//!                  └─ TCP connection
//! ```
//!
//! Because every layer implements the same trait, the caller cannot tell how
//! many layers sit underneath it.
//!
//! - **`connection`** – The capability trait and the delegate types used to
//!   receive messages and broken-connection notifications.
//! - **`diagnostics`** – A small publish/subscribe hub for
//!   `(source, level, message)` diagnostic lines, bridged into `tracing`.
//! - **`hexdump`** – The hex-dump row formatter and the tracing decorator.
//! - **`compose`** – The connection factory that assembles the decorator
//!   stack for one outbound connection attempt.

pub mod compose;
pub mod connection;
pub mod diagnostics;
pub mod hexdump;

// Re-export the most-used types at the crate root so callers can write
// `wstalk_core::NetworkConnection` instead of the full module path.
pub use compose::{ClientEncryption, ConnectionFactory, DecoratedConnectionFactory};
pub use connection::{BrokenDelegate, ConnectionError, MessageReceivedDelegate, NetworkConnection};
pub use diagnostics::{levels, DiagnosticDelegate, DiagnosticsSender, Subscription};
pub use hexdump::{HexDumpDecorator, HexDumpDelegate, HexDumpRows};
