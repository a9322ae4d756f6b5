//! ClientLifecycle: connect, talk, and close one WebSocket.
//!
//! The orchestrator walks the states of [`LifecycleState`]:
//!
//! 1. **connect** – sends the upgrade request and polls the transaction in
//!    bounded waits until it completes or the shutdown flag is set.
//! 2. **converse** – reads console lines and sends each non-empty one as a
//!    text message until shutdown, end of input, or the server closes.
//! 3. **close** – sends a close frame and waits, bounded, for the server to
//!    acknowledge it.
//!
//! # Architecture
//!
//! The orchestrator depends only on the [`UpgradeExchange`] and
//! [`UpgradeSession`] traits.  Every wait has a ceiling, and cancellation is
//! cooperative: nothing is aborted, loops simply observe [`ShutdownFlag`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::http::Request;
use tracing::debug;
use wstalk_core::{levels, DiagnosticsSender};

use crate::application::upgrade::{
    SessionDelegates, TransactionState, UpgradeDelegate, UpgradeExchange, UpgradeSession,
};
use crate::domain::{ClientConfig, ConnectFailure, LifecycleState};

/// Source label for the orchestrator's diagnostic lines.
pub const SOURCE: &str = "WsTalk";

/// Close code sent when we end the session.
pub const CLOSE_CODE_NORMAL: u16 = 1000;

/// Close reason sent when we end the session.
pub const CLOSE_REASON: &str = "Kthxbye";

/// Prompt published once the WebSocket is established.
pub const PROMPT: &str =
    "Type messages or press <Ctrl>+<C> (and then <Enter>, if necessary) to exit.";

/// Set once when the user asks the program to stop.
///
/// Written by the Ctrl+C handler and read by every loop.  A single atomic
/// boolean with no other state attached, so `Relaxed` ordering is enough.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown.  Setting it again has no further effect.
    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Raised when the WebSocket reports that it has closed.
///
/// The flag and its wake-up live in one `watch` channel, so a waiter that
/// starts after the signal was raised still sees it.
#[derive(Debug, Clone)]
pub struct CloseSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CloseSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn raise(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_raised(&self) -> bool {
        *self.sender.borrow()
    }

    /// Waits up to `timeout` for the signal.  Returns `true` if it was (or
    /// already had been) raised.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut receiver = self.sender.subscribe();
        let raised = matches!(
            tokio::time::timeout(timeout, receiver.wait_for(|raised| *raised)).await,
            Ok(Ok(_))
        );
        raised
    }
}

/// Drives one WebSocket from connection to close.
pub struct ClientLifecycle {
    config: ClientConfig,
    exchange: Arc<dyn UpgradeExchange>,
    session: Option<Arc<dyn UpgradeSession>>,
    diagnostics: DiagnosticsSender,
    shutdown: ShutdownFlag,
    closed: CloseSignal,
    state: LifecycleState,
}

impl ClientLifecycle {
    /// Creates an orchestrator in the `Idle` state.
    ///
    /// Diagnostic lines are published through `diagnostics`; subscribe to
    /// it before calling [`connect`](Self::connect).
    pub fn new(
        config: ClientConfig,
        exchange: Arc<dyn UpgradeExchange>,
        session: Arc<dyn UpgradeSession>,
        diagnostics: DiagnosticsSender,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            config,
            exchange,
            session: Some(session),
            diagnostics,
            shutdown,
            closed: CloseSignal::new(),
            state: LifecycleState::Idle,
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// The signal raised when the session reports it has closed.
    pub fn close_signal(&self) -> CloseSignal {
        self.closed.clone()
    }

    /// Runs the whole lifecycle: connect, converse over `input`, close.
    ///
    /// # Errors
    ///
    /// Returns the [`ConnectFailure`] if the WebSocket was never established.
    pub async fn run<R>(&mut self, input: R) -> Result<(), ConnectFailure>
    where
        R: AsyncBufRead + Unpin,
    {
        self.connect().await?;
        self.converse(input).await;
        self.close().await;
        Ok(())
    }

    /// Requests the upgrade and waits until the WebSocket is established.
    ///
    /// # Errors
    ///
    /// Returns why the attempt failed; the same reason is left in
    /// [`LifecycleState::Failed`] and published as a diagnostic line.
    pub async fn connect(&mut self) -> Result<(), ConnectFailure> {
        if self.state != LifecycleState::Idle {
            debug!(state = %self.state, "connect ignored");
            return Ok(());
        }
        let Some(session) = self.session.clone() else {
            return self.fail(ConnectFailure::UnableToConnect);
        };
        self.state = LifecycleState::Connecting;

        let mut request = Request::new(());
        *request.uri_mut() = self.config.url.clone();
        self.diagnostics.send(
            levels::INFO,
            format!("Connecting to '{}'...", self.config.url),
        );
        session.start_open_as_client(&mut request);
        session.set_delegates(self.session_delegates());

        let engaged = Arc::new(AtomicBool::new(false));
        let on_upgrade: UpgradeDelegate = {
            let engaged = Arc::clone(&engaged);
            let session = Arc::clone(&session);
            Box::new(move |response, connection, trailer| {
                if session.finish_open_as_client(connection, response, trailer) {
                    engaged.store(true, Ordering::SeqCst);
                }
            })
        };
        let transaction = self.exchange.request(request, on_upgrade);
        self.state = LifecycleState::AwaitingUpgrade;

        while !self.shutdown.is_set() {
            if !transaction
                .await_completion(self.config.request_poll_interval)
                .await
            {
                continue;
            }
            let failure = match transaction.state() {
                TransactionState::Completed if engaged.load(Ordering::SeqCst) => {
                    self.state = LifecycleState::Established;
                    self.diagnostics.send(levels::INFO, "Connection established.");
                    return Ok(());
                }
                TransactionState::Completed => match transaction.response() {
                    Some(status) if status.code == 101 => ConnectFailure::NotEngaged,
                    Some(status) => ConnectFailure::Refused {
                        status: status.code,
                        reason: status.reason,
                    },
                    None => ConnectFailure::Broken,
                },
                TransactionState::UnableToConnect => ConnectFailure::UnableToConnect,
                TransactionState::Broken => ConnectFailure::Broken,
                TransactionState::Timeout => ConnectFailure::Timeout,
                TransactionState::InProgress => continue,
            };
            self.session = None;
            return self.fail(failure);
        }
        self.session = None;
        self.fail(ConnectFailure::Canceled)
    }

    /// Runs the interactive loop while the WebSocket is established.
    ///
    /// Each non-empty line read from `input` is sent as a text message.  The
    /// loop ends when the shutdown flag is set, the server closes the
    /// WebSocket, or `input` reaches end of file; the state then becomes
    /// `ClosingLocal`.
    pub async fn converse<R>(&mut self, input: R)
    where
        R: AsyncBufRead + Unpin,
    {
        if self.state != LifecycleState::Established {
            return;
        }
        self.diagnostics.send(levels::INFO, PROMPT);
        let mut lines = input.lines();
        while !self.shutdown.is_set() && !self.closed.is_raised() {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if self.shutdown.is_set() {
                            break;
                        }
                        if line.is_empty() {
                            continue;
                        }
                        self.diagnostics
                            .send(levels::DETAIL, format!("Sending text message: {line}"));
                        if let Some(session) = &self.session {
                            session.send_text(&line);
                        }
                    }
                    Ok(None) => {
                        debug!("console input ended");
                        break;
                    }
                    Err(e) => {
                        self.diagnostics
                            .send(levels::ERROR, format!("error reading console input: {e}"));
                        break;
                    }
                },
                _ = tokio::time::sleep(self.config.input_poll_interval) => {}
            }
        }
        self.state = LifecycleState::ClosingLocal;
    }

    /// Closes our end of the WebSocket and waits, bounded, for the server to
    /// close its end.  Always ends in `Closed`.
    ///
    /// Calling this in any state other than `Established` or `ClosingLocal`
    /// does nothing.
    pub async fn close(&mut self) {
        match self.state {
            LifecycleState::Established => self.state = LifecycleState::ClosingLocal,
            LifecycleState::ClosingLocal => {}
            _ => return,
        }
        if let Some(session) = &self.session {
            session.close(CLOSE_CODE_NORMAL, CLOSE_REASON);
        }
        if !self.closed.wait(self.config.close_timeout).await {
            self.diagnostics.send(
                levels::ERROR,
                "Timed out waiting for WebSocket to close on server end",
            );
        }
        self.session = None;
        self.state = LifecycleState::Closed;
    }

    fn fail(&mut self, failure: ConnectFailure) -> Result<(), ConnectFailure> {
        self.diagnostics.send(failure.level(), failure.to_string());
        self.state = LifecycleState::Failed(failure.clone());
        Err(failure)
    }

    fn session_delegates(&self) -> SessionDelegates {
        let text = self.diagnostics.clone();
        let ping = self.diagnostics.clone();
        let close = self.diagnostics.clone();
        let closed = self.closed.clone();
        SessionDelegates {
            text: Some(Arc::new(move |data: &str| {
                text.send(levels::DETAIL, format!("Text from WebSocket: {data}"));
            })),
            ping: Some(Arc::new(move |data: &[u8]| {
                ping.send(
                    levels::DEBUG,
                    format!("Ping from WebSocket: {}", String::from_utf8_lossy(data)),
                );
            })),
            close: Some(Arc::new(move |code: u16, reason: &str| {
                closed.raise();
                close.send(levels::INFO, format!("WebSocket closed: {code} {reason}"));
            })),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
