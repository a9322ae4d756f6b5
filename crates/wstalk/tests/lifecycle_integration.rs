//! Integration tests for the client lifecycle orchestrator.
//!
//! The orchestrator is driven end to end with no network: the upgrade
//! exchange and its transaction are hand-written doubles, and the WebSocket
//! session is a `mockall` mock whose close expectation can play the server's
//! close acknowledgment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mockall::mock;
use tokio::io::BufReader;
use tokio_tungstenite::tungstenite::http::{Request, Response, StatusCode};

use wstalk::application::client_lifecycle::{CLOSE_CODE_NORMAL, CLOSE_REASON, SOURCE};
use wstalk::application::upgrade::{
    ResponseStatus, SessionDelegates, Transaction, TransactionState, UpgradeDelegate,
    UpgradeExchange, UpgradeSession,
};
use wstalk::application::{ClientLifecycle, ShutdownFlag};
use wstalk::domain::{ClientConfig, ConnectFailure, LifecycleState};
use wstalk_core::{
    levels, BrokenDelegate, ConnectionError, DiagnosticDelegate, DiagnosticsSender,
    MessageReceivedDelegate, NetworkConnection, Subscription,
};

// ── Doubles ───────────────────────────────────────────────────────────────────

mock! {
    Session {}

    impl UpgradeSession for Session {
        fn start_open_as_client(&self, request: &mut Request<()>);
        fn finish_open_as_client(
            &self,
            connection: Arc<dyn NetworkConnection>,
            response: &Response<()>,
            trailer: &[u8],
        ) -> bool;
        fn set_delegates(&self, delegates: SessionDelegates);
        fn send_text(&self, text: &str);
        fn close(&self, code: u16, reason: &str);
    }
}

/// A connection that does nothing; it only has to exist.
struct NullConnection;

#[async_trait]
impl NetworkConnection for NullConnection {
    fn subscribe_to_diagnostics(&self, _: DiagnosticDelegate, _: usize) -> Subscription {
        Subscription::empty()
    }
    async fn connect(&self, _: SocketAddr) -> Result<(), ConnectionError> {
        Ok(())
    }
    fn process(&self, _: MessageReceivedDelegate, _: BrokenDelegate) -> Result<(), ConnectionError> {
        Ok(())
    }
    fn peer_address(&self) -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }
    fn peer_port(&self) -> u16 {
        80
    }
    fn is_connected(&self) -> bool {
        true
    }
    fn bound_address(&self) -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }
    fn bound_port(&self) -> u16 {
        40000
    }
    fn send_message(&self, _: &[u8]) {}
    fn close(&self, _: bool) {}
}

/// A transaction that finishes in `outcome` after `delay`, or never.
struct ScriptedTransaction {
    started: Instant,
    delay: Option<Duration>,
    outcome: TransactionState,
    response: Option<ResponseStatus>,
}

impl ScriptedTransaction {
    fn finished(&self) -> bool {
        self.delay
            .map_or(false, |delay| self.started.elapsed() >= delay)
    }
}

#[async_trait]
impl Transaction for ScriptedTransaction {
    async fn await_completion(&self, timeout: Duration) -> bool {
        let Some(delay) = self.delay else {
            tokio::time::sleep(timeout).await;
            return false;
        };
        let remaining = delay.saturating_sub(self.started.elapsed());
        if remaining <= timeout {
            tokio::time::sleep(remaining).await;
            true
        } else {
            tokio::time::sleep(timeout).await;
            false
        }
    }

    fn state(&self) -> TransactionState {
        if self.finished() {
            self.outcome
        } else {
            TransactionState::InProgress
        }
    }

    fn response(&self) -> Option<ResponseStatus> {
        if self.finished() {
            self.response.clone()
        } else {
            None
        }
    }
}

/// An exchange that plays back one scripted outcome.
struct ScriptedExchange {
    delay: Option<Duration>,
    outcome: TransactionState,
    /// Status line of the response; a 101 also runs the upgrade delegate.
    status: Option<(u16, &'static str)>,
    requests: Mutex<Vec<Request<()>>>,
}

impl ScriptedExchange {
    fn new(
        delay: Option<Duration>,
        outcome: TransactionState,
        status: Option<(u16, &'static str)>,
    ) -> Arc<Self> {
        Arc::new(Self {
            delay,
            outcome,
            status,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn upgrading() -> Arc<Self> {
        Self::new(
            Some(Duration::from_millis(10)),
            TransactionState::Completed,
            Some((101, "Switching Protocols")),
        )
    }
}

impl UpgradeExchange for ScriptedExchange {
    fn request(&self, request: Request<()>, on_upgrade: UpgradeDelegate) -> Arc<dyn Transaction> {
        self.requests.lock().unwrap().push(request);
        if let Some((101, _)) = self.status {
            let response = Response::builder()
                .status(StatusCode::SWITCHING_PROTOCOLS)
                .body(())
                .unwrap();
            on_upgrade(&response, Arc::new(NullConnection), b"");
        }
        Arc::new(ScriptedTransaction {
            started: Instant::now(),
            delay: self.delay,
            outcome: self.outcome,
            response: self.status.map(|(code, reason)| ResponseStatus {
                code,
                reason: reason.to_string(),
            }),
        })
    }
}

type Lines = Arc<Mutex<Vec<(usize, String)>>>;
type DelegateSlot = Arc<Mutex<Option<SessionDelegates>>>;

/// Everything a test needs to drive and inspect one lifecycle.
struct Harness {
    diagnostics: DiagnosticsSender,
    lines: Lines,
    _subscription: Subscription,
    shutdown: ShutdownFlag,
    config: ClientConfig,
}

impl Harness {
    fn new() -> Self {
        let diagnostics = DiagnosticsSender::new(SOURCE);
        let lines: Lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let subscription = diagnostics.subscribe(
            Arc::new(move |_source: &str, level: usize, message: &str| {
                sink.lock().unwrap().push((level, message.to_string()))
            }),
            levels::DEBUG,
        );
        let mut config = ClientConfig::new("ws://localhost:9/chat".parse().unwrap());
        config.request_poll_interval = Duration::from_millis(20);
        config.close_timeout = Duration::from_millis(150);
        config.input_poll_interval = Duration::from_millis(10);
        Self {
            diagnostics,
            lines,
            _subscription: subscription,
            shutdown: ShutdownFlag::new(),
            config,
        }
    }

    fn lifecycle(&self, exchange: Arc<ScriptedExchange>, session: MockSession) -> ClientLifecycle {
        ClientLifecycle::new(
            self.config.clone(),
            exchange,
            Arc::new(session),
            self.diagnostics.clone(),
            self.shutdown.clone(),
        )
    }

    fn has_line(&self, text: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|(_, m)| m == text)
    }

    fn lines_at(&self, level: usize) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

/// A session mock that accepts the opening calls and keeps the delegates.
fn opening_session(engages: bool) -> (MockSession, DelegateSlot) {
    let slot: DelegateSlot = Arc::new(Mutex::new(None));
    let mut session = MockSession::new();
    session.expect_start_open_as_client().returning(|_| ());
    let keep = Arc::clone(&slot);
    session
        .expect_set_delegates()
        .returning(move |delegates| *keep.lock().unwrap() = Some(delegates));
    session
        .expect_finish_open_as_client()
        .returning(move |_, _, _| engages);
    (session, slot)
}

fn fire_close(slot: &DelegateSlot, code: u16, reason: &str) {
    let delegates = slot.lock().unwrap().clone();
    if let Some(close) = delegates.and_then(|d| d.close) {
        close(code, reason);
    }
}

const TIMEOUT_LINE: &str = "Timed out waiting for WebSocket to close on server end";

// ── Connecting ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_completed_and_engaged_reaches_established() {
    // Arrange
    let harness = Harness::new();
    let (session, _slot) = opening_session(true);
    let exchange = ScriptedExchange::upgrading();
    let mut lifecycle = harness.lifecycle(Arc::clone(&exchange), session);

    // Act
    let result = lifecycle.connect().await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(*lifecycle.state(), LifecycleState::Established);
    assert!(harness.has_line("Connecting to 'ws://localhost:9/chat'..."));
    assert!(harness.has_line("Connection established."));
    let requests = exchange.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].uri(), "ws://localhost:9/chat");
}

#[tokio::test]
async fn test_timeout_fails_without_engaging() {
    // Arrange
    let harness = Harness::new();
    let mut session = MockSession::new();
    session.expect_start_open_as_client().returning(|_| ());
    session.expect_set_delegates().returning(|_| ());
    session.expect_finish_open_as_client().times(0);
    let exchange = ScriptedExchange::new(
        Some(Duration::from_millis(30)),
        TransactionState::Timeout,
        None,
    );
    let mut lifecycle = harness.lifecycle(exchange, session);

    // Act
    let result = lifecycle.connect().await;

    // Assert
    assert_eq!(result, Err(ConnectFailure::Timeout));
    assert_eq!(
        *lifecycle.state(),
        LifecycleState::Failed(ConnectFailure::Timeout)
    );
    assert_eq!(
        harness.lines_at(levels::ERROR),
        vec!["timeout waiting for response".to_string()]
    );
}

#[tokio::test]
async fn test_shutdown_while_awaiting_cancels_without_network_error() {
    // Arrange
    let harness = Harness::new();
    let (session, _slot) = opening_session(true);
    let exchange = ScriptedExchange::new(None, TransactionState::Completed, None);
    let mut lifecycle = harness.lifecycle(exchange, session);
    let interrupt = harness.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        interrupt.set();
    });

    // Act
    let result = lifecycle.connect().await;

    // Assert
    assert_eq!(result, Err(ConnectFailure::Canceled));
    assert!(harness.lines_at(levels::ERROR).is_empty());
    assert_eq!(
        harness.lines_at(levels::WARNING),
        vec!["Fetch Canceled".to_string()]
    );
}

#[tokio::test]
async fn test_non_upgrade_response_is_refused() {
    let harness = Harness::new();
    let (session, _slot) = opening_session(true);
    let exchange = ScriptedExchange::new(
        Some(Duration::from_millis(5)),
        TransactionState::Completed,
        Some((404, "Not Found")),
    );
    let mut lifecycle = harness.lifecycle(exchange, session);

    let result = lifecycle.connect().await;

    assert_eq!(
        result,
        Err(ConnectFailure::Refused {
            status: 404,
            reason: "Not Found".to_string()
        })
    );
    assert!(harness.has_line("Got back response: 404 Not Found"));
}

#[tokio::test]
async fn test_upgrade_the_session_rejects_is_not_engaged() {
    let harness = Harness::new();
    let (session, _slot) = opening_session(false);
    let mut lifecycle = harness.lifecycle(ScriptedExchange::upgrading(), session);

    let result = lifecycle.connect().await;

    assert_eq!(result, Err(ConnectFailure::NotEngaged));
    assert!(harness.has_line("Connection upgraded, but failed to engage WebSocket"));
}

#[tokio::test]
async fn test_unreachable_server_is_unable_to_connect() {
    let harness = Harness::new();
    let (session, _slot) = opening_session(true);
    let exchange = ScriptedExchange::new(
        Some(Duration::from_millis(5)),
        TransactionState::UnableToConnect,
        None,
    );
    let mut lifecycle = harness.lifecycle(exchange, session);

    let result = lifecycle.connect().await;

    assert_eq!(result, Err(ConnectFailure::UnableToConnect));
}

// ── Conversing ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_converse_sends_non_empty_lines_until_end_of_input() {
    // Arrange
    let harness = Harness::new();
    let (mut session, _slot) = opening_session(true);
    let sent = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&sent);
    session
        .expect_send_text()
        .returning(move |text| record.lock().unwrap().push(text.to_string()));
    let mut lifecycle = harness.lifecycle(ScriptedExchange::upgrading(), session);
    lifecycle.connect().await.unwrap();

    // Act
    lifecycle.converse(&b"hello\n\nworld\n"[..]).await;

    // Assert
    assert_eq!(*sent.lock().unwrap(), vec!["hello".to_string(), "world".to_string()]);
    assert_eq!(*lifecycle.state(), LifecycleState::ClosingLocal);
    assert!(harness.has_line("Sending text message: hello"));
    assert!(harness.lines_at(levels::INFO).iter().any(|l| l.starts_with("Type messages")));
}

#[tokio::test]
async fn test_peer_close_ends_conversation() {
    // Arrange
    let harness = Harness::new();
    let (session, slot) = opening_session(true);
    let mut lifecycle = harness.lifecycle(ScriptedExchange::upgrading(), session);
    lifecycle.connect().await.unwrap();
    let (_console, input) = tokio::io::duplex(64);
    let closer = Arc::clone(&slot);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        fire_close(&closer, 1001, "going away");
    });

    // Act
    lifecycle.converse(BufReader::new(input)).await;

    // Assert
    assert_eq!(*lifecycle.state(), LifecycleState::ClosingLocal);
    assert!(harness.has_line("WebSocket closed: 1001 going away"));
}

#[tokio::test]
async fn test_interrupt_ends_conversation() {
    let harness = Harness::new();
    let (session, _slot) = opening_session(true);
    let mut lifecycle = harness.lifecycle(ScriptedExchange::upgrading(), session);
    lifecycle.connect().await.unwrap();
    let (_console, input) = tokio::io::duplex(64);
    let interrupt = harness.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        interrupt.set();
    });

    lifecycle.converse(BufReader::new(input)).await;

    assert_eq!(*lifecycle.state(), LifecycleState::ClosingLocal);
}

// ── Closing ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_close_acknowledged_in_time_has_no_timeout_line() {
    // Arrange
    let harness = Harness::new();
    let (mut session, slot) = opening_session(true);
    let ack = Arc::clone(&slot);
    let closes = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&closes);
    session.expect_close().times(1).returning(move |code, reason| {
        record.lock().unwrap().push((code, reason.to_string()));
        fire_close(&ack, code, reason);
    });
    let mut lifecycle = harness.lifecycle(ScriptedExchange::upgrading(), session);
    lifecycle.connect().await.unwrap();

    // Act
    lifecycle.close().await;

    // Assert
    assert_eq!(*lifecycle.state(), LifecycleState::Closed);
    assert_eq!(
        *closes.lock().unwrap(),
        vec![(CLOSE_CODE_NORMAL, CLOSE_REASON.to_string())]
    );
    assert!(!harness.has_line(TIMEOUT_LINE));
    assert!(harness.has_line("WebSocket closed: 1000 Kthxbye"));
}

#[tokio::test]
async fn test_close_not_acknowledged_logs_timeout_and_still_closes() {
    // Arrange
    let harness = Harness::new();
    let (mut session, _slot) = opening_session(true);
    session.expect_close().times(1).returning(|_, _| ());
    let mut lifecycle = harness.lifecycle(ScriptedExchange::upgrading(), session);
    lifecycle.connect().await.unwrap();

    // Act
    let started = Instant::now();
    lifecycle.close().await;

    // Assert
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(*lifecycle.state(), LifecycleState::Closed);
    assert_eq!(harness.lines_at(levels::ERROR), vec![TIMEOUT_LINE.to_string()]);
}

#[tokio::test]
async fn test_close_acknowledged_too_late_still_closes_after_timeout_line() {
    // Arrange: the server's acknowledgment arrives well after the bound.
    let harness = Harness::new();
    let (mut session, slot) = opening_session(true);
    let ack = Arc::clone(&slot);
    session.expect_close().times(1).returning(move |code, reason| {
        let ack = Arc::clone(&ack);
        let reason = reason.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            fire_close(&ack, code, &reason);
        });
    });
    let mut lifecycle = harness.lifecycle(ScriptedExchange::upgrading(), session);
    lifecycle.connect().await.unwrap();
    let signal = lifecycle.close_signal();

    // Act
    lifecycle.close().await;
    let state_at_timeout = lifecycle.state().clone();
    tokio::time::sleep(Duration::from_millis(400)).await;

    // Assert
    assert_eq!(state_at_timeout, LifecycleState::Closed);
    assert_eq!(*lifecycle.state(), LifecycleState::Closed);
    assert!(signal.is_raised());
    let lines: Vec<String> = harness
        .lines
        .lock()
        .unwrap()
        .iter()
        .map(|(_, m)| m.clone())
        .collect();
    let timed_out = lines.iter().position(|m| m == TIMEOUT_LINE);
    let closed = lines.iter().position(|m| m == "WebSocket closed: 1000 Kthxbye");
    assert!(timed_out.is_some() && closed.is_some(), "{lines:?}");
    assert!(timed_out < closed);
}

#[tokio::test]
async fn test_close_after_closed_is_a_no_op() {
    let harness = Harness::new();
    let (mut session, slot) = opening_session(true);
    let ack = Arc::clone(&slot);
    session
        .expect_close()
        .times(1)
        .returning(move |code, reason| fire_close(&ack, code, reason));
    let mut lifecycle = harness.lifecycle(ScriptedExchange::upgrading(), session);
    lifecycle.connect().await.unwrap();

    lifecycle.close().await;
    lifecycle.close().await;

    assert_eq!(*lifecycle.state(), LifecycleState::Closed);
}

#[tokio::test]
async fn test_run_goes_from_idle_to_closed() {
    // Arrange
    let harness = Harness::new();
    let (mut session, slot) = opening_session(true);
    session.expect_send_text().times(1).returning(|_| ());
    let ack = Arc::clone(&slot);
    session
        .expect_close()
        .times(1)
        .returning(move |code, reason| fire_close(&ack, code, reason));
    let mut lifecycle = harness.lifecycle(ScriptedExchange::upgrading(), session);

    // Act
    let result = lifecycle.run(&b"ping?\n"[..]).await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(*lifecycle.state(), LifecycleState::Closed);
}

#[tokio::test]
async fn test_run_reports_connect_failure() {
    let harness = Harness::new();
    let (session, _slot) = opening_session(true);
    let exchange = ScriptedExchange::new(
        Some(Duration::from_millis(5)),
        TransactionState::Broken,
        None,
    );
    let mut lifecycle = harness.lifecycle(exchange, session);

    let result = lifecycle.run(&b""[..]).await;

    assert_eq!(result, Err(ConnectFailure::Broken));
    assert!(lifecycle.state().is_terminal());
}
