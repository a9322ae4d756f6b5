//! [`TcpConnection`]: the raw connection at the bottom of every stack.
//!
//! Built on `tokio::net::TcpStream` split into its two halves:
//!
//! - A **writer task** drains an unbounded queue of outbound buffers, so
//!   `send_message` never blocks and may be called from any delegate.
//! - A **reader task**, started by `process`, pushes every chunk it reads to
//!   `on_message` and reports the end of the stream to `on_broken`.
//!
//! A clean close drops the queue sender: the writer flushes what is left,
//! shuts down the write direction, and the reader keeps running until the
//! peer closes its end.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use wstalk_core::{
    levels, BrokenDelegate, ConnectionError, DiagnosticDelegate, DiagnosticsSender,
    MessageReceivedDelegate, NetworkConnection, Subscription,
};

/// Size of the buffer each read fills.
const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Default)]
struct State {
    peer: Option<SocketAddr>,
    local: Option<SocketAddr>,
    connected: bool,
    reader: Option<OwnedReadHalf>,
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    tasks: Vec<JoinHandle<()>>,
}

/// A TCP connection implementing [`NetworkConnection`].
pub struct TcpConnection {
    state: Arc<Mutex<State>>,
    diagnostics: DiagnosticsSender,
}

impl Default for TcpConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpConnection {
    /// Creates an unconnected connection.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            diagnostics: DiagnosticsSender::new("TcpConnection"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl NetworkConnection for TcpConnection {
    fn subscribe_to_diagnostics(
        &self,
        delegate: DiagnosticDelegate,
        min_level: usize,
    ) -> Subscription {
        self.diagnostics.subscribe(delegate, min_level)
    }

    async fn connect(&self, peer: SocketAddr) -> Result<(), ConnectionError> {
        let stream = TcpStream::connect(peer)
            .await
            .map_err(|source| ConnectionError::ConnectFailed { addr: peer, source })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable Nagle on {peer}: {e}");
        }
        let local = stream.local_addr().ok();
        let (reader, mut writer) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let diagnostics = self.diagnostics.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(buffer) = rx.recv().await {
                if let Err(e) = writer.write_all(&buffer).await {
                    diagnostics.send(levels::ERROR, format!("error sending to {peer}: {e}"));
                    return;
                }
            }
            // Sender dropped: clean close.
            if let Err(e) = writer.shutdown().await {
                debug!("shutdown of write direction to {peer} failed: {e}");
            }
        });

        let mut state = self.lock();
        state.peer = Some(peer);
        state.local = local;
        state.connected = true;
        state.reader = Some(reader);
        state.outbound = Some(tx);
        state.tasks.push(writer_task);
        drop(state);

        self.diagnostics
            .send(levels::DEBUG, format!("connected to {peer}"));
        Ok(())
    }

    fn process(
        &self,
        on_message: MessageReceivedDelegate,
        on_broken: BrokenDelegate,
    ) -> Result<(), ConnectionError> {
        let mut state = self.lock();
        let Some(mut reader) = state.reader.take() else {
            return Err(if state.connected {
                ConnectionError::AlreadyProcessing
            } else {
                ConnectionError::NotConnected
            });
        };
        let shared = Arc::clone(&self.state);
        let diagnostics = self.diagnostics.clone();
        let reader_task = tokio::spawn(async move {
            let mut buffer = vec![0u8; READ_BUFFER_SIZE];
            let graceful = loop {
                match reader.read(&mut buffer).await {
                    Ok(0) => break true,
                    Ok(n) => on_message(&buffer[..n]),
                    Err(e) => {
                        diagnostics.send(levels::WARNING, format!("error reading: {e}"));
                        break false;
                    }
                }
            };
            {
                let mut state = lock_state(&shared);
                state.connected = false;
                state.outbound = None;
            }
            on_broken(graceful);
        });
        state.tasks.push(reader_task);
        Ok(())
    }

    fn peer_address(&self) -> IpAddr {
        self.lock()
            .peer
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    fn peer_port(&self) -> u16 {
        self.lock().peer.map(|addr| addr.port()).unwrap_or(0)
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn bound_address(&self) -> IpAddr {
        self.lock()
            .local
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    fn bound_port(&self) -> u16 {
        self.lock().local.map(|addr| addr.port()).unwrap_or(0)
    }

    fn send_message(&self, message: &[u8]) {
        if let Some(outbound) = &self.lock().outbound {
            // A send error means the writer task has already stopped.
            let _ = outbound.send(message.to_vec());
        }
    }

    fn close(&self, clean: bool) {
        let mut state = self.lock();
        state.outbound = None;
        if clean {
            return;
        }
        state.connected = false;
        state.reader = None;
        for task in state.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        for task in self.lock().tasks.drain(..) {
            task.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
