//! [`HexDumpDecorator`]: a connection decorator that traces every byte.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;

use crate::connection::{BrokenDelegate, ConnectionError, MessageReceivedDelegate, NetworkConnection};
use crate::diagnostics::{DiagnosticDelegate, Subscription};
use crate::hexdump::format::{received_announcement, sending_announcement, HexDumpRows};

/// Receives one line of hex-dump output.
pub type HexDumpDelegate = Arc<dyn Fn(&str) + Send + Sync>;

struct Inner {
    lower: Arc<dyn NetworkConnection>,
    hex_dump_delegate: HexDumpDelegate,
    /// Held while one call's announcement and rows are emitted so rows from
    /// concurrent calls never interleave.
    emit_lock: Mutex<()>,
}

impl Inner {
    fn dump(&self, announcement: String, data: &[u8]) {
        let _guard = self.emit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        (self.hex_dump_delegate)(&announcement);
        for row in HexDumpRows::new(data) {
            (self.hex_dump_delegate)(&row);
        }
    }
}

/// Wraps a connection and publishes a hex dump of all data sent and received
/// through it.
///
/// Every [`NetworkConnection`] method is forwarded unchanged to the wrapped
/// connection.  Only two operations are intercepted:
///
/// - [`send_message`](NetworkConnection::send_message) dumps the outbound
///   bytes *before* handing them to the lower layer, so the trace is visible
///   even if the transmission never completes.
/// - [`process`](NetworkConnection::process) installs an adapter that dumps
///   each inbound message before delivering it to the caller's delegate.
///
/// The adapter holds only a weak reference to the decorator's state.  If a
/// message arrives after the decorator has been dropped, the adapter does
/// nothing.
pub struct HexDumpDecorator {
    inner: Arc<Inner>,
}

impl HexDumpDecorator {
    /// Decorates `lower`, publishing each hex-dump line through
    /// `hex_dump_delegate` and nowhere else.
    pub fn decorate(lower: Arc<dyn NetworkConnection>, hex_dump_delegate: HexDumpDelegate) -> Self {
        Self {
            inner: Arc::new(Inner {
                lower,
                hex_dump_delegate,
                emit_lock: Mutex::new(()),
            }),
        }
    }

    /// Builds a hex-dump delegate that publishes every line through
    /// `diagnostics` under `label` at `level`.
    pub fn labelled_delegate(
        diagnostics: DiagnosticDelegate,
        label: &str,
        level: usize,
    ) -> HexDumpDelegate {
        let label = label.to_string();
        Arc::new(move |line: &str| diagnostics(&label, level, line))
    }
}

#[async_trait]
impl NetworkConnection for HexDumpDecorator {
    fn subscribe_to_diagnostics(
        &self,
        delegate: DiagnosticDelegate,
        min_level: usize,
    ) -> Subscription {
        self.inner.lower.subscribe_to_diagnostics(delegate, min_level)
    }

    async fn connect(&self, peer: SocketAddr) -> Result<(), ConnectionError> {
        self.inner.lower.connect(peer).await
    }

    fn process(
        &self,
        on_message: MessageReceivedDelegate,
        on_broken: BrokenDelegate,
    ) -> Result<(), ConnectionError> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let traced: MessageReceivedDelegate = Arc::new(move |message: &[u8]| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.dump(received_announcement(message.len()), message);
            drop(inner);
            on_message(message);
        });
        self.inner.lower.process(traced, on_broken)
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
        self.inner
            .dump(sending_announcement(message.len()), message);
        self.inner.lower.send_message(message);
    }

    fn close(&self, clean: bool) {
        self.inner.lower.close(clean);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
