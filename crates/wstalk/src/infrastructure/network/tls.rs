//! [`TlsDecorator`]: client-side TLS as a connection decorator.
//!
//! `rustls` is driven as a sans-I/O engine.  The decorator never touches a
//! socket; it feeds ciphertext from the lower connection into the engine and
//! hands the engine's ciphertext back to the lower connection:
//!
//! ```text
//! send_message(plain) ─► writer() ─► write_tls ─► lower.send_message(cipher)
//! lower on_message(cipher) ─► read_tls ─► process_new_packets ─► reader() ─► on_message(plain)
//! ```
//!
//! # Locking (for beginners)
//!
//! The engine sits behind one mutex.  The lock is released before anything
//! is passed down to the lower connection or up to the caller's delegates,
//! so a delegate may call `send_message` again (as an HTTP or WebSocket
//! layer does) without deadlocking.
//!
//! Records carry sequence numbers, so they must reach the lower connection
//! in the order the engine produced them.  A second mutex, `send_order`, is
//! taken before the engine and held until the ciphertext has been handed to
//! `lower.send_message`.  It is never held while calling up into a delegate.

use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore};
use tracing::debug;
use wstalk_core::{
    levels, BrokenDelegate, ClientEncryption, ConnectionError, DiagnosticDelegate,
    DiagnosticsSender, MessageReceivedDelegate, NetworkConnection, Subscription,
};

/// Size of each plaintext read drained from the engine.
const PLAINTEXT_CHUNK: usize = 16 * 1024;

struct Engine {
    tls: ClientConnection,
    on_message: Option<MessageReceivedDelegate>,
    on_broken: Option<BrokenDelegate>,
}

impl Engine {
    /// Drains every pending TLS record into one buffer.
    fn pending_ciphertext(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while self.tls.wants_write() {
            match self.tls.write_tls(&mut out) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("write_tls into buffer failed: {e}");
                    break;
                }
            }
        }
        out
    }

    /// Appends every decrypted byte available to `plaintext`.  Returns
    /// `true` when the peer has sent `close_notify`.
    fn drain_plaintext(&mut self, plaintext: &mut Vec<u8>) -> bool {
        let mut chunk = [0u8; PLAINTEXT_CHUNK];
        loop {
            match self.tls.reader().read(&mut chunk) {
                Ok(0) => return true,
                Ok(n) => plaintext.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
                Err(e) => {
                    debug!("plaintext read ended: {e}");
                    return true;
                }
            }
        }
    }

    /// Takes the broken delegate so it fires at most once.
    fn take_broken(&mut self) -> Option<BrokenDelegate> {
        self.on_message = None;
        self.on_broken.take()
    }
}

/// Outcome of feeding one chunk of ciphertext to the engine.
#[derive(Default)]
struct Received {
    plaintext: Vec<u8>,
    ciphertext: Vec<u8>,
    error: Option<rustls::Error>,
    peer_closed: bool,
}

struct Inner {
    lower: Arc<dyn NetworkConnection>,
    engine: Mutex<Engine>,
    send_order: Mutex<()>,
    diagnostics: DiagnosticsSender,
}

impl Inner {
    fn engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock order: `send_order` first, then `engine`.
    fn send_order(&self) -> MutexGuard<'_, ()> {
        self.send_order.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self) {
        let _order = self.send_order();
        let ciphertext = self.engine().pending_ciphertext();
        if !ciphertext.is_empty() {
            self.lower.send_message(&ciphertext);
        }
    }

    fn receive(&self, mut data: &[u8]) {
        let mut received = Received::default();
        let order = self.send_order();
        let (on_message, on_broken) = {
            let mut engine = self.engine();
            while !data.is_empty() && received.error.is_none() && !received.peer_closed {
                match engine.tls.read_tls(&mut data) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        received.error = Some(rustls::Error::General(e.to_string()));
                        break;
                    }
                }
                match engine.tls.process_new_packets() {
                    Ok(_) => {
                        received.peer_closed = engine.drain_plaintext(&mut received.plaintext);
                    }
                    Err(e) => received.error = Some(e),
                }
            }
            received.ciphertext = engine.pending_ciphertext();
            let on_message = engine.on_message.clone();
            let on_broken = if received.error.is_some() || received.peer_closed {
                engine.take_broken()
            } else {
                None
            };
            (on_message, on_broken)
        };

        if !received.ciphertext.is_empty() {
            self.lower.send_message(&received.ciphertext);
        }
        drop(order);

        if !received.plaintext.is_empty() {
            if let Some(on_message) = on_message {
                on_message(&received.plaintext);
            }
        }
        if let Some(error) = received.error {
            self.diagnostics
                .send(levels::ERROR, format!("TLS error: {error}"));
            self.lower.close(false);
            if let Some(on_broken) = on_broken {
                on_broken(false);
            }
        } else if received.peer_closed {
            self.diagnostics
                .send(levels::DEBUG, "peer sent close_notify");
            if let Some(on_broken) = on_broken {
                on_broken(true);
            }
        }
    }

    fn broken(&self, graceful: bool) {
        let on_broken = self.engine().take_broken();
        if let Some(on_broken) = on_broken {
            on_broken(graceful);
        }
    }
}

/// A connection decorator that encrypts everything sent and decrypts
/// everything received, acting as a TLS client.
pub struct TlsDecorator {
    inner: Arc<Inner>,
}

impl TlsDecorator {
    /// Wraps `lower` in a TLS client that trusts the certificates in
    /// `ca_certs` (PEM) and expects the server to be `server_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Encryption`] when the bundle holds no
    /// usable certificate, `server_name` is not a valid DNS name or IP
    /// address, or the engine cannot be created.
    pub fn configure_as_client(
        lower: Arc<dyn NetworkConnection>,
        ca_certs: &str,
        server_name: &str,
    ) -> Result<Self, ConnectionError> {
        let config = client_config(ca_certs)?;
        let name = ServerName::try_from(server_name.to_string()).map_err(|e| {
            ConnectionError::Encryption(format!("invalid server name '{server_name}': {e}"))
        })?;
        let tls = ClientConnection::new(Arc::new(config), name)
            .map_err(|e| ConnectionError::Encryption(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                lower,
                engine: Mutex::new(Engine {
                    tls,
                    on_message: None,
                    on_broken: None,
                }),
                send_order: Mutex::new(()),
                diagnostics: DiagnosticsSender::new("TlsDecorator"),
            }),
        })
    }

    /// Whether the TLS handshake is still in progress.
    pub fn is_handshaking(&self) -> bool {
        self.inner.engine().tls.is_handshaking()
    }
}

/// Builds a rustls client configuration trusting only `ca_certs`.
fn client_config(ca_certs: &str) -> Result<ClientConfig, ConnectionError> {
    let certs = CertificateDer::pem_slice_iter(ca_certs.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectionError::Encryption(format!("unreadable CA certificates: {e}")))?;
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if ignored > 0 {
        debug!("ignored {ignored} unparsable CA certificate(s)");
    }
    if added == 0 {
        return Err(ConnectionError::Encryption(
            "no trusted CA certificates".to_string(),
        ));
    }
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ConnectionError::Encryption(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

#[async_trait]
impl NetworkConnection for TlsDecorator {
    fn subscribe_to_diagnostics(
        &self,
        delegate: DiagnosticDelegate,
        min_level: usize,
    ) -> Subscription {
        self.inner
            .diagnostics
            .subscribe(Arc::clone(&delegate), min_level)
            .join(self.inner.lower.subscribe_to_diagnostics(delegate, min_level))
    }

    async fn connect(&self, peer: SocketAddr) -> Result<(), ConnectionError> {
        self.inner.lower.connect(peer).await
    }

    fn process(
        &self,
        on_message: MessageReceivedDelegate,
        on_broken: BrokenDelegate,
    ) -> Result<(), ConnectionError> {
        {
            let mut engine = self.inner.engine();
            engine.on_message = Some(on_message);
            engine.on_broken = Some(on_broken);
        }
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let weak_broken = weak.clone();
        self.inner.lower.process(
            Arc::new(move |data: &[u8]| {
                if let Some(inner) = weak.upgrade() {
                    inner.receive(data);
                }
            }),
            Arc::new(move |graceful| {
                if let Some(inner) = weak_broken.upgrade() {
                    inner.broken(graceful);
                }
            }),
        )?;
        // The ClientHello is already queued; send it.
        self.inner.flush();
        Ok(())
    }

    fn peer_address(&self) -> IpAddr {
        self.inner.lower.peer_address()
    }

    fn peer_port(&self) -> u16 {
        self.inner.lower.peer_port()
    }

    fn is_connected(&self) -> bool {
        self.inner.lower.is_connected()
    }

    fn bound_address(&self) -> IpAddr {
        self.inner.lower.bound_address()
    }

    fn bound_port(&self) -> u16 {
        self.inner.lower.bound_port()
    }

    fn send_message(&self, message: &[u8]) {
        let written = {
            let _order = self.inner.send_order();
            let ciphertext = {
                let mut engine = self.inner.engine();
                // Before the handshake completes rustls buffers the plaintext
                // and encrypts it once the session keys exist.
                let written = engine.tls.writer().write_all(message);
                written.map(|()| engine.pending_ciphertext())
            };
            ciphertext.map(|ciphertext| {
                if !ciphertext.is_empty() {
                    self.inner.lower.send_message(&ciphertext);
                }
            })
        };
        if let Err(e) = written {
            self.inner
                .diagnostics
                .send(levels::ERROR, format!("unable to encrypt message: {e}"));
        }
    }

    fn close(&self, clean: bool) {
        if clean {
            let _order = self.inner.send_order();
            let ciphertext = {
                let mut engine = self.inner.engine();
                engine.tls.send_close_notify();
                engine.pending_ciphertext()
            };
            if !ciphertext.is_empty() {
                self.inner.lower.send_message(&ciphertext);
            }
        }
        self.inner.lower.close(clean);
    }
}

/// [`ClientEncryption`] backed by [`TlsDecorator`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TlsClientEncryption;

impl ClientEncryption for TlsClientEncryption {
    fn configure_as_client(
        &self,
        lower: Arc<dyn NetworkConnection>,
        ca_certs: &str,
        server_name: &str,
    ) -> Result<Arc<dyn NetworkConnection>, ConnectionError> {
        let decorator = TlsDecorator::configure_as_client(lower, ca_certs, server_name)?;
        Ok(Arc::new(decorator))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
