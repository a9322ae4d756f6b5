//! HTTP/1.1 upgrade exchange.
//!
//! [`HttpUpgradeClient`] implements [`UpgradeExchange`]: each request runs
//! on its own tokio task that
//!
//! 1. resolves the host and asks the [`ConnectionFactory`] for a fresh
//!    connection stack,
//! 2. connects, starts processing, and sends the serialized request,
//! 3. reads until a complete response head (and, for non-upgrade responses,
//!    its `Content-Length` body) has arrived,
//! 4. for `101 Switching Protocols`, hands the connection and any bytes
//!    after the head to the upgrade delegate,
//! 5. publishes the final [`TransactionState`].
//!
//! The whole exchange is bounded by the request timeout.
//!
//! - **`wire`** – Request serialization and response-head parsing (httparse).
//! - **`handoff`** – Re-routing received data from the HTTP exchange to the
//!   upgraded protocol.

pub mod handoff;
pub mod wire;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::http::{Request, StatusCode};
use tracing::debug;
use wstalk_core::{
    levels, ConnectionFactory, DiagnosticDelegate, DiagnosticsSender, NetworkConnection,
    Subscription,
};

use crate::application::upgrade::{
    ResponseStatus, Transaction, TransactionState, UpgradeDelegate, UpgradeExchange,
};
use crate::domain::config::default_port;
use handoff::{Event, Router, UpgradedConnection};
use wire::{parse_response_head, serialize_request, ResponseHead};

/// Why an exchange ended without a complete response.
#[derive(Debug, Error)]
enum ExchangeError {
    #[error("{0}")]
    Unreachable(String),
    #[error("{0}")]
    Broken(String),
}

impl ExchangeError {
    fn state(&self) -> TransactionState {
        match self {
            ExchangeError::Unreachable(_) => TransactionState::UnableToConnect,
            ExchangeError::Broken(_) => TransactionState::Broken,
        }
    }
}

struct Shared {
    state: watch::Sender<TransactionState>,
    response: Mutex<Option<ResponseStatus>>,
}

impl Shared {
    fn complete(&self, state: TransactionState, response: Option<ResponseStatus>) {
        *self.response.lock().unwrap_or_else(PoisonError::into_inner) = response;
        self.state.send_replace(state);
    }
}

/// Handle to one request issued by [`HttpUpgradeClient`].
///
/// Dropping the handle aborts the exchange if it is still running.
pub struct HttpTransaction {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

#[async_trait]
impl Transaction for HttpTransaction {
    async fn await_completion(&self, timeout: Duration) -> bool {
        let mut receiver = self.shared.state.subscribe();
        let completed = matches!(
            tokio::time::timeout(
                timeout,
                receiver.wait_for(|state| *state != TransactionState::InProgress),
            )
            .await,
            Ok(Ok(_))
        );
        completed
    }

    fn state(&self) -> TransactionState {
        *self.shared.state.borrow()
    }

    fn response(&self) -> Option<ResponseStatus> {
        self.shared
            .response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for HttpTransaction {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// An [`UpgradeExchange`] speaking HTTP/1.1 over connections from a
/// [`ConnectionFactory`].
pub struct HttpUpgradeClient {
    factory: Arc<dyn ConnectionFactory>,
    request_timeout: Duration,
    diagnostics: DiagnosticsSender,
}

impl HttpUpgradeClient {
    pub fn new(factory: Arc<dyn ConnectionFactory>, request_timeout: Duration) -> Self {
        Self {
            factory,
            request_timeout,
            diagnostics: DiagnosticsSender::new("HttpClient"),
        }
    }

    /// Subscribes to lines from the client and from every connection it
    /// creates.
    pub fn subscribe_to_diagnostics(
        &self,
        delegate: DiagnosticDelegate,
        min_level: usize,
    ) -> Subscription {
        self.diagnostics.subscribe(delegate, min_level)
    }
}

impl UpgradeExchange for HttpUpgradeClient {
    fn request(&self, request: Request<()>, on_upgrade: UpgradeDelegate) -> Arc<dyn Transaction> {
        let (state, _) = watch::channel(TransactionState::InProgress);
        let shared = Arc::new(Shared {
            state,
            response: Mutex::new(None),
        });
        let exchange = Exchange {
            factory: Arc::clone(&self.factory),
            diagnostics: self.diagnostics.clone(),
            shared: Arc::clone(&shared),
        };
        let timeout = self.request_timeout;
        let task = tokio::spawn(exchange.run(request, on_upgrade, timeout));
        Arc::new(HttpTransaction { shared, task })
    }
}

/// State carried by one exchange task.
struct Exchange {
    factory: Arc<dyn ConnectionFactory>,
    diagnostics: DiagnosticsSender,
    shared: Arc<Shared>,
}

impl Exchange {
    async fn run(self, request: Request<()>, on_upgrade: UpgradeDelegate, timeout: Duration) {
        // Holds the connection while the exchange owns it, so a timeout can
        // close it.
        let connection: Mutex<Option<Arc<dyn NetworkConnection>>> = Mutex::new(None);
        let outcome =
            tokio::time::timeout(timeout, self.exchange(request, on_upgrade, &connection)).await;
        let (state, response) = match outcome {
            Ok(Ok(status)) => (TransactionState::Completed, Some(status)),
            Ok(Err(e)) => {
                self.diagnostics.send(levels::WARNING, e.to_string());
                (e.state(), None)
            }
            Err(_) => {
                let pending = connection
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(connection) = pending {
                    connection.close(false);
                }
                (TransactionState::Timeout, None)
            }
        };
        self.shared.complete(state, response);
    }

    async fn exchange(
        &self,
        request: Request<()>,
        on_upgrade: UpgradeDelegate,
        slot: &Mutex<Option<Arc<dyn NetworkConnection>>>,
    ) -> Result<ResponseStatus, ExchangeError> {
        let uri = request.uri().clone();
        let scheme = uri.scheme_str().unwrap_or_default().to_ascii_lowercase();
        let host = uri
            .host()
            .ok_or_else(|| ExchangeError::Unreachable(format!("no host in '{uri}'")))?
            .to_string();
        let port = uri.port_u16().unwrap_or_else(|| default_port(&scheme));

        let peer = resolve(&host, port).await?;
        let connection = self
            .factory
            .create(&scheme, &host)
            .map_err(|e| ExchangeError::Unreachable(e.to_string()))?;
        // Lives as long as the connection; the stack is dropped with it.
        let _ = connection.subscribe_to_diagnostics(self.diagnostics.chain(), levels::DEBUG);
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&connection));

        connection
            .connect(peer)
            .await
            .map_err(|e| ExchangeError::Unreachable(e.to_string()))?;
        let (router, mut events) = Router::new();
        let (on_data, on_broken) = router.delegates();
        connection
            .process(on_data, on_broken)
            .map_err(|e| ExchangeError::Unreachable(e.to_string()))?;
        debug!(%peer, "sending {} {}", request.method(), uri);
        connection.send_message(&serialize_request(&request));

        let mut buffer = Vec::new();
        let head = read_head(&mut events, &mut buffer).await?;
        let status = ResponseStatus {
            code: head.response.status().as_u16(),
            reason: head.reason.clone(),
        };
        self.diagnostics.send(
            levels::DEBUG,
            format!("response: {} {}", status.code, status.reason),
        );

        if head.response.status() == StatusCode::SWITCHING_PROTOCOLS {
            // Data already queued came before the switch; everything later is
            // held for the new owner.
            let mut trailer = buffer.split_off(head.head_len);
            trailer.extend_from_slice(&router.hold(&mut events));
            let upgraded: Arc<dyn NetworkConnection> =
                Arc::new(UpgradedConnection::new(Arc::clone(&connection), router));
            on_upgrade(&head.response, upgraded, &trailer);
        } else {
            let body_len = head.content_length();
            let mut have = buffer.len() - head.head_len;
            while have < body_len {
                match events.recv().await {
                    Some(Event::Data(data)) => have += data.len(),
                    _ => break,
                }
            }
            connection.close(true);
        }
        slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(status)
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ExchangeError> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ExchangeError::Unreachable(format!("unable to resolve '{host}': {e}")))?
        .next()
        .ok_or_else(|| ExchangeError::Unreachable(format!("no addresses for '{host}'")))
}

async fn read_head(
    events: &mut mpsc::UnboundedReceiver<Event>,
    buffer: &mut Vec<u8>,
) -> Result<ResponseHead, ExchangeError> {
    loop {
        match events.recv().await {
            Some(Event::Data(data)) => {
                buffer.extend_from_slice(&data);
                match parse_response_head(buffer) {
                    Ok(Some(head)) => return Ok(head),
                    Ok(None) => {}
                    Err(e) => return Err(ExchangeError::Broken(e.to_string())),
                }
            }
            Some(Event::Broken(_)) | None => {
                return Err(ExchangeError::Broken(
                    "connection closed before response".to_string(),
                ))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
