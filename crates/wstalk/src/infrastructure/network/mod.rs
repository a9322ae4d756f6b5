//! Network infrastructure: the concrete connections at the bottom of the
//! decorator stack.
//!
//! - **`tcp`** – [`TcpConnection`], the raw connection (tokio).
//! - **`tls`** – [`TlsDecorator`], the encryption decorator (rustls), and
//!   [`TlsClientEncryption`], which plugs it into the connection factory.

pub mod tcp;
pub mod tls;

use std::sync::Arc;

use wstalk_core::compose::RawConnectionFactory;
use wstalk_core::NetworkConnection;

pub use tcp::TcpConnection;
pub use tls::{TlsClientEncryption, TlsDecorator};

/// A [`RawConnectionFactory`] that creates a fresh [`TcpConnection`] each
/// time it is called.
pub fn tcp_connection_factory() -> RawConnectionFactory {
    Arc::new(|| Arc::new(TcpConnection::new()) as Arc<dyn NetworkConnection>)
}
