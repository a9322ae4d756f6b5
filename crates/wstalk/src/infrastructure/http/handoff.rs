//! Handing a connection from the HTTP exchange to the upgraded protocol.
//!
//! A connection can only be processed once, yet its received data has two
//! consumers in turn: first the HTTP client reading the response head, then
//! the upgraded protocol.  [`Router`] owns the delegates installed on the
//! connection and switches where data goes:
//!
//! 1. **Http** – chunks are queued for the exchange task.
//! 2. **Buffer** – after the head is parsed, chunks are held until the new
//!    owner calls `process`.
//! 3. **Deliver** – chunks go straight to the new owner's delegates.
//!
//! [`UpgradedConnection`] is what the new owner sees: the same connection,
//! with `process` re-routed through the router.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use wstalk_core::{
    BrokenDelegate, ConnectionError, DiagnosticDelegate, MessageReceivedDelegate,
    NetworkConnection, Subscription,
};

/// What the exchange task hears from the connection.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    Data(Vec<u8>),
    Broken(bool),
}

enum Route {
    Http(mpsc::UnboundedSender<Event>),
    Buffer { data: Vec<u8>, broken: Option<bool> },
    Deliver(MessageReceivedDelegate, BrokenDelegate),
}

/// Routes received data to the current owner of a connection.
pub struct Router {
    route: Mutex<Route>,
    /// Serializes deliveries so buffered data always precedes newer data.
    delivery: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Router {
    /// Creates a router in the HTTP phase, returning the receiving end of
    /// its event queue.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let router = Arc::new(Self {
            route: Mutex::new(Route::Http(tx)),
            delivery: Mutex::new(()),
        });
        (router, rx)
    }

    /// Delegates to install on the connection with `process`.
    pub fn delegates(self: &Arc<Self>) -> (MessageReceivedDelegate, BrokenDelegate) {
        let on_data = Arc::clone(self);
        let on_broken = Arc::clone(self);
        (
            Arc::new(move |data: &[u8]| on_data.data(data)),
            Arc::new(move |graceful| on_broken.broken(graceful)),
        )
    }

    /// Stops queueing to the exchange task; later data is buffered until
    /// [`attach`](Self::attach).
    ///
    /// Drains `events`, returning the data already queued.  A break already
    /// queued is kept for the new owner.
    pub fn hold(&self, events: &mut mpsc::UnboundedReceiver<Event>) -> Vec<u8> {
        let _order = lock(&self.delivery);
        let mut queued = Vec::new();
        let mut broken = None;
        while let Ok(event) = events.try_recv() {
            match event {
                Event::Data(data) => queued.extend_from_slice(&data),
                Event::Broken(graceful) => broken = Some(graceful),
            }
        }
        *lock(&self.route) = Route::Buffer {
            data: Vec::new(),
            broken,
        };
        queued
    }

    /// Installs the new owner's delegates and replays anything buffered.
    pub fn attach(&self, on_message: MessageReceivedDelegate, on_broken: BrokenDelegate) {
        let _order = lock(&self.delivery);
        let previous = std::mem::replace(
            &mut *lock(&self.route),
            Route::Deliver(Arc::clone(&on_message), Arc::clone(&on_broken)),
        );
        if let Route::Buffer { data, broken } = previous {
            if !data.is_empty() {
                on_message(&data);
            }
            if let Some(graceful) = broken {
                on_broken(graceful);
            }
        }
    }

    fn data(&self, data: &[u8]) {
        let _order = lock(&self.delivery);
        let target = match &mut *lock(&self.route) {
            Route::Http(tx) => {
                let _ = tx.send(Event::Data(data.to_vec()));
                None
            }
            Route::Buffer { data: buffered, .. } => {
                buffered.extend_from_slice(data);
                None
            }
            Route::Deliver(on_message, _) => Some(Arc::clone(on_message)),
        };
        if let Some(on_message) = target {
            on_message(data);
        }
    }

    fn broken(&self, graceful: bool) {
        let _order = lock(&self.delivery);
        let target = match &mut *lock(&self.route) {
            Route::Http(tx) => {
                let _ = tx.send(Event::Broken(graceful));
                None
            }
            Route::Buffer { broken, .. } => {
                *broken = Some(graceful);
                None
            }
            Route::Deliver(_, on_broken) => Some(Arc::clone(on_broken)),
        };
        if let Some(on_broken) = target {
            on_broken(graceful);
        }
    }
}

/// The upgraded view of a connection: every call forwards to the
/// connection, except `process`, which attaches to the [`Router`].
pub struct UpgradedConnection {
    lower: Arc<dyn NetworkConnection>,
    router: Arc<Router>,
}

impl UpgradedConnection {
    pub fn new(lower: Arc<dyn NetworkConnection>, router: Arc<Router>) -> Self {
        Self { lower, router }
    }
}

#[async_trait]
impl NetworkConnection for UpgradedConnection {
    fn subscribe_to_diagnostics(
        &self,
        delegate: DiagnosticDelegate,
        min_level: usize,
    ) -> Subscription {
        self.lower.subscribe_to_diagnostics(delegate, min_level)
    }

    async fn connect(&self, peer: SocketAddr) -> Result<(), ConnectionError> {
        self.lower.connect(peer).await
    }

    fn process(
        &self,
        on_message: MessageReceivedDelegate,
        on_broken: BrokenDelegate,
    ) -> Result<(), ConnectionError> {
        self.router.attach(on_message, on_broken);
        Ok(())
    }

    fn peer_address(&self) -> IpAddr {
        self.lower.peer_address()
    }

    fn peer_port(&self) -> u16 {
        self.lower.peer_port()
    }

    fn is_connected(&self) -> bool {
        self.lower.is_connected()
    }

    fn bound_address(&self) -> IpAddr {
        self.lower.bound_address()
    }

    fn bound_port(&self) -> u16 {
        self.lower.bound_port()
    }

    fn send_message(&self, message: &[u8]) {
        self.lower.send_message(message);
    }

    fn close(&self, clean: bool) {
        self.lower.close(clean);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
