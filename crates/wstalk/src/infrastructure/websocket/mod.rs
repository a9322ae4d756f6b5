//! [`WebSocketSession`]: the client end of a WebSocket, on top of any
//! [`NetworkConnection`].
//!
//! Framing is done by `tungstenite`'s [`WebSocketContext`], which works
//! against any `Read + Write` stream.  The session gives it a [`Bridge`]
//! instead of a socket: received bytes are appended to the bridge's input,
//! and whatever the context writes is collected and passed to
//! `send_message` once the session lock has been released.
//!
//! # Handshake (for beginners)
//!
//! The client sends a random `Sec-WebSocket-Key`; the server proves it
//! speaks WebSocket by answering `101 Switching Protocols` with
//! `Sec-WebSocket-Accept` set to a hash of that key.  Only then is the
//! connection handed to the session.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, Request, Response, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role, WebSocketContext};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use wstalk_core::{
    levels, DiagnosticDelegate, DiagnosticsSender, NetworkConnection, Subscription,
};

use crate::application::upgrade::{SessionDelegates, UpgradeSession};

/// Close code reported when the connection ends without a close frame.
pub const CLOSE_CODE_ABNORMAL: u16 = 1006;

/// Close code reported when the peer's close frame carried no status.
pub const CLOSE_CODE_NO_STATUS: u16 = 1005;

/// An in-memory stream between the WebSocket context and the connection.
#[derive(Default)]
struct Bridge {
    incoming: VecDeque<u8>,
    outgoing: Vec<u8>,
}

impl Read for Bridge {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.incoming.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        self.incoming.read(buf)
    }
}

impl Write for Bridge {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outgoing.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Something the session must report once its lock is released.
enum Event {
    Text(String),
    Ping(Vec<u8>),
    Closed(u16, String),
}

#[derive(Default)]
struct State {
    key: Option<String>,
    context: Option<WebSocketContext>,
    bridge: Bridge,
    connection: Option<Arc<dyn NetworkConnection>>,
    delegates: SessionDelegates,
    close_reported: bool,
}

impl State {
    /// Flushes the context and takes everything written so far.
    fn outgoing(&mut self) -> Vec<u8> {
        if let Some(context) = self.context.as_mut() {
            // Errors here only say the close handshake has finished.
            let _ = context.flush(&mut self.bridge);
        }
        std::mem::take(&mut self.bridge.outgoing)
    }
}

struct Inner {
    state: Mutex<State>,
    diagnostics: DiagnosticsSender,
}

/// Work collected under the lock and carried out after it is released.
#[derive(Default)]
struct Followup {
    connection: Option<Arc<dyn NetworkConnection>>,
    outgoing: Vec<u8>,
    events: Vec<Event>,
    close_connection: bool,
    delegates: SessionDelegates,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, followup: Followup) {
        if let Some(connection) = &followup.connection {
            if !followup.outgoing.is_empty() {
                connection.send_message(&followup.outgoing);
            }
        }
        for event in followup.events {
            match event {
                Event::Text(text) => {
                    if let Some(delegate) = &followup.delegates.text {
                        delegate(&text);
                    }
                }
                Event::Ping(data) => {
                    if let Some(delegate) = &followup.delegates.ping {
                        delegate(&data);
                    }
                }
                Event::Closed(code, reason) => {
                    if let Some(delegate) = &followup.delegates.close {
                        delegate(code, &reason);
                    }
                }
            }
        }
        if followup.close_connection {
            if let Some(connection) = &followup.connection {
                connection.close(true);
            }
        }
    }

    /// Feeds received bytes to the context and reports every complete
    /// message.
    fn receive(&self, data: &[u8]) {
        let followup = {
            let mut state = self.state();
            state.bridge.incoming.extend(data);
            let mut followup = Followup::default();
            let State {
                context,
                bridge,
                close_reported,
                ..
            } = &mut *state;
            let Some(context) = context.as_mut() else {
                return;
            };
            loop {
                match context.read(&mut *bridge) {
                    Ok(Message::Text(text)) => followup.events.push(Event::Text(text)),
                    Ok(Message::Ping(payload)) => followup.events.push(Event::Ping(payload)),
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
                            None => (CLOSE_CODE_NO_STATUS, String::new()),
                        };
                        if !*close_reported {
                            *close_reported = true;
                            followup.events.push(Event::Closed(code, reason));
                        }
                        followup.close_connection = true;
                    }
                    Ok(_) => {}
                    Err(WsError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => break,
                    Err(e) => {
                        self.diagnostics
                            .send(levels::ERROR, format!("WebSocket protocol error: {e}"));
                        if !*close_reported {
                            *close_reported = true;
                            followup
                                .events
                                .push(Event::Closed(CLOSE_CODE_ABNORMAL, e.to_string()));
                        }
                        followup.close_connection = true;
                        break;
                    }
                }
            }
            followup.outgoing = state.outgoing();
            followup.connection = state.connection.clone();
            followup.delegates = state.delegates.clone();
            followup
        };
        self.run(followup);
    }

    fn broken(&self, graceful: bool) {
        let followup = {
            let mut state = self.state();
            if state.close_reported {
                return;
            }
            state.close_reported = true;
            let reason = if graceful {
                "connection closed by peer"
            } else {
                "connection broken by peer"
            };
            Followup {
                events: vec![Event::Closed(CLOSE_CODE_ABNORMAL, reason.to_string())],
                delegates: state.delegates.clone(),
                ..Followup::default()
            }
        };
        self.run(followup);
    }

    fn write(&self, message: Message) {
        let followup = {
            let mut state = self.state();
            let State {
                context, bridge, ..
            } = &mut *state;
            let Some(context) = context.as_mut() else {
                return;
            };
            if let Err(e) = context.write(bridge, message) {
                self.diagnostics
                    .send(levels::WARNING, format!("unable to send WebSocket message: {e}"));
            }
            Followup {
                outgoing: state.outgoing(),
                connection: state.connection.clone(),
                ..Followup::default()
            }
        };
        self.run(followup);
    }
}

/// The client end of a WebSocket.
pub struct WebSocketSession {
    inner: Arc<Inner>,
}

impl Default for WebSocketSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketSession {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                diagnostics: DiagnosticsSender::new("WebSocket"),
            }),
        }
    }

    pub fn subscribe_to_diagnostics(
        &self,
        delegate: DiagnosticDelegate,
        min_level: usize,
    ) -> Subscription {
        self.inner.diagnostics.subscribe(delegate, min_level)
    }

    /// Checks `response` against the handshake rules; returns why it fails.
    fn validate(&self, response: &Response<()>) -> Result<(), String> {
        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            return Err(format!("status {} is not 101", response.status().as_u16()));
        }
        let headers = response.headers();
        let upgrade = headers
            .get(header::UPGRADE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !upgrade.trim().eq_ignore_ascii_case("websocket") {
            return Err(format!("Upgrade header is '{upgrade}'"));
        }
        let connection = headers
            .get(header::CONNECTION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !connection
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        {
            return Err(format!("Connection header is '{connection}'"));
        }
        let key = self
            .inner
            .state()
            .key
            .clone()
            .ok_or_else(|| "handshake was never started".to_string())?;
        let expected = derive_accept_key(key.as_bytes());
        let accept = headers
            .get(header::SEC_WEBSOCKET_ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if accept.trim() != expected {
            return Err("Sec-WebSocket-Accept does not match our key".to_string());
        }
        Ok(())
    }
}

impl UpgradeSession for WebSocketSession {
    fn start_open_as_client(&self, request: &mut Request<()>) {
        let key = generate_key();
        let headers = request.headers_mut();
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        match HeaderValue::from_str(&key) {
            Ok(value) => {
                headers.insert(header::SEC_WEBSOCKET_KEY, value);
                self.inner.state().key = Some(key);
            }
            Err(e) => self
                .inner
                .diagnostics
                .send(levels::ERROR, format!("unusable WebSocket key: {e}")),
        }
    }

    fn finish_open_as_client(
        &self,
        connection: Arc<dyn NetworkConnection>,
        response: &Response<()>,
        trailer: &[u8],
    ) -> bool {
        if let Err(reason) = self.validate(response) {
            self.inner
                .diagnostics
                .send(levels::WARNING, format!("WebSocket handshake failed: {reason}"));
            return false;
        }
        {
            let mut state = self.inner.state();
            state.context = Some(WebSocketContext::new(Role::Client, None));
            state.connection = Some(Arc::clone(&connection));
            // Trailer bytes precede anything the connection delivers later.
            state.bridge.incoming.extend(trailer);
        }
        // Frames in the trailer are handled before `process`, which may
        // replay a break that happened right after the response.
        self.inner.receive(&[]);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let weak_broken = weak.clone();
        let processed = connection.process(
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
        );
        if let Err(e) = processed {
            self.inner
                .diagnostics
                .send(levels::ERROR, format!("unable to process upgraded connection: {e}"));
            let mut state = self.inner.state();
            state.context = None;
            state.connection = None;
            return false;
        }
        self.inner
            .diagnostics
            .send(levels::DEBUG, "WebSocket engaged");
        true
    }

    fn set_delegates(&self, delegates: SessionDelegates) {
        self.inner.state().delegates = delegates;
    }

    fn send_text(&self, text: &str) {
        self.inner.write(Message::Text(text.to_string()));
    }

    fn close(&self, code: u16, reason: &str) {
        let followup = {
            let mut state = self.inner.state();
            let State {
                context, bridge, ..
            } = &mut *state;
            let Some(context) = context.as_mut() else {
                return;
            };
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: Cow::Owned(reason.to_string()),
            };
            if let Err(e) = context.close(bridge, Some(frame)) {
                self.inner
                    .diagnostics
                    .send(levels::DEBUG, format!("close not sent: {e}"));
            }
            Followup {
                outgoing: state.outgoing(),
                connection: state.connection.clone(),
                ..Followup::default()
            }
        };
        self.inner.run(followup);
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        let connection = {
            let state = self.inner.state();
            if state.close_reported {
                None
            } else {
                state.connection.clone()
            }
        };
        if let Some(connection) = connection {
            connection.close(false);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use async_trait::async_trait;
    use wstalk_core::{BrokenDelegate, ConnectionError, MessageReceivedDelegate};

    use crate::infrastructure::http::handoff::{Router, UpgradedConnection};

    /// Connection double: records sends and lets the test deliver data.
    #[derive(Default)]
    struct FakeConnection {
        sent: Mutex<Vec<u8>>,
        delegates: Mutex<Option<(MessageReceivedDelegate, BrokenDelegate)>>,
        closed: Mutex<Option<bool>>,
    }

    impl FakeConnection {
        fn take_sent(&self) -> Vec<u8> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }

        fn deliver(&self, data: &[u8]) {
            let delegates = self.delegates.lock().unwrap().clone();
            if let Some((on_message, _)) = delegates {
                on_message(data);
            }
        }

        fn hang_up(&self, graceful: bool) {
            let delegates = self.delegates.lock().unwrap().clone();
            if let Some((_, on_broken)) = delegates {
                on_broken(graceful);
            }
        }
    }

    #[async_trait]
    impl NetworkConnection for FakeConnection {
        fn subscribe_to_diagnostics(&self, _: DiagnosticDelegate, _: usize) -> Subscription {
            Subscription::empty()
        }
        async fn connect(&self, _: SocketAddr) -> Result<(), ConnectionError> {
            Ok(())
        }
        fn process(
            &self,
            on_message: MessageReceivedDelegate,
            on_broken: BrokenDelegate,
        ) -> Result<(), ConnectionError> {
            *self.delegates.lock().unwrap() = Some((on_message, on_broken));
            Ok(())
        }
        fn peer_address(&self) -> IpAddr {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
        fn peer_port(&self) -> u16 {
            443
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
        fn send_message(&self, message: &[u8]) {
            self.sent.lock().unwrap().extend_from_slice(message);
        }
        fn close(&self, clean: bool) {
            *self.closed.lock().unwrap() = Some(clean);
        }
    }

    /// The server end, framing with a server-role context.
    struct Server {
        context: WebSocketContext,
        bridge: Bridge,
    }

    impl Server {
        fn new() -> Self {
            Self {
                context: WebSocketContext::new(Role::Server, None),
                bridge: Bridge::default(),
            }
        }

        fn frame(&mut self, message: Message) -> Vec<u8> {
            self.context.write(&mut self.bridge, message).unwrap();
            self.context.flush(&mut self.bridge).unwrap();
            std::mem::take(&mut self.bridge.outgoing)
        }

        fn read(&mut self, data: &[u8]) -> Vec<Message> {
            self.bridge.incoming.extend(data);
            let mut messages = Vec::new();
            while let Ok(message) = self.context.read(&mut self.bridge) {
                messages.push(message);
            }
            messages
        }

        fn take_outgoing(&mut self) -> Vec<u8> {
            let _ = self.context.flush(&mut self.bridge);
            std::mem::take(&mut self.bridge.outgoing)
        }
    }

    #[derive(Default)]
    struct Seen {
        texts: Mutex<Vec<String>>,
        pings: Mutex<Vec<Vec<u8>>>,
        closes: Mutex<Vec<(u16, String)>>,
    }

    fn delegates(seen: &Arc<Seen>) -> SessionDelegates {
        let texts = Arc::clone(seen);
        let pings = Arc::clone(seen);
        let closes = Arc::clone(seen);
        SessionDelegates {
            text: Some(Arc::new(move |text: &str| {
                texts.texts.lock().unwrap().push(text.to_string())
            })),
            ping: Some(Arc::new(move |data: &[u8]| {
                pings.pings.lock().unwrap().push(data.to_vec())
            })),
            close: Some(Arc::new(move |code, reason: &str| {
                closes.closes.lock().unwrap().push((code, reason.to_string()))
            })),
        }
    }

    fn started_session() -> (WebSocketSession, String) {
        let session = WebSocketSession::new();
        let mut request = Request::new(());
        session.start_open_as_client(&mut request);
        let key = request.headers()[header::SEC_WEBSOCKET_KEY]
            .to_str()
            .unwrap()
            .to_string();
        (session, key)
    }

    fn upgrade_response(accept: &str) -> Response<()> {
        Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .header(header::UPGRADE, "websocket")
            .header(header::CONNECTION, "Upgrade")
            .header(header::SEC_WEBSOCKET_ACCEPT, accept)
            .body(())
            .unwrap()
    }

    fn engaged(trailer: &[u8]) -> (WebSocketSession, Arc<FakeConnection>, Arc<Seen>) {
        let (session, key) = started_session();
        let seen = Arc::new(Seen::default());
        session.set_delegates(delegates(&seen));
        let connection = Arc::new(FakeConnection::default());
        let response = upgrade_response(&derive_accept_key(key.as_bytes()));
        assert!(session.finish_open_as_client(
            Arc::clone(&connection) as Arc<dyn NetworkConnection>,
            &response,
            trailer,
        ));
        (session, connection, seen)
    }

    #[test]
    fn test_start_open_adds_upgrade_headers() {
        // Arrange
        let session = WebSocketSession::new();
        let mut request = Request::new(());

        // Act
        session.start_open_as_client(&mut request);

        // Assert
        let headers = request.headers();
        assert_eq!(headers[header::UPGRADE], "websocket");
        assert_eq!(headers[header::CONNECTION], "Upgrade");
        assert_eq!(headers[header::SEC_WEBSOCKET_VERSION], "13");
        assert_eq!(headers[header::SEC_WEBSOCKET_KEY].len(), 24);
    }

    #[test]
    fn test_valid_accept_key_engages() {
        let (_session, connection, _seen) = engaged(b"");
        assert!(connection.delegates.lock().unwrap().is_some());
    }

    #[test]
    fn test_wrong_accept_key_refuses() {
        // Arrange
        let (session, _key) = started_session();
        let connection = Arc::new(FakeConnection::default());
        let response = upgrade_response(&derive_accept_key(b"somebody else's key"));

        // Act
        let engaged = session.finish_open_as_client(connection.clone(), &response, b"");

        // Assert
        assert!(!engaged);
        assert!(connection.delegates.lock().unwrap().is_none());
    }

    #[test]
    fn test_non_101_status_refuses() {
        let (session, key) = started_session();
        let mut response = upgrade_response(&derive_accept_key(key.as_bytes()));
        *response.status_mut() = StatusCode::OK;

        let engaged =
            session.finish_open_as_client(Arc::new(FakeConnection::default()), &response, b"");

        assert!(!engaged);
    }

    #[test]
    fn test_missing_upgrade_header_refuses() {
        let (session, key) = started_session();
        let mut response = upgrade_response(&derive_accept_key(key.as_bytes()));
        response.headers_mut().remove(header::UPGRADE);

        let engaged =
            session.finish_open_as_client(Arc::new(FakeConnection::default()), &response, b"");

        assert!(!engaged);
    }

    #[test]
    fn test_text_from_server_reaches_delegate() {
        // Arrange
        let (_session, connection, seen) = engaged(b"");
        let mut server = Server::new();

        // Act
        connection.deliver(&server.frame(Message::Text("hello".to_string())));

        // Assert
        assert_eq!(*seen.texts.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_trailer_frames_are_processed_on_engage() {
        let mut server = Server::new();
        let trailer = server.frame(Message::Text("early".to_string()));

        let (_session, _connection, seen) = engaged(&trailer);

        assert_eq!(*seen.texts.lock().unwrap(), vec!["early".to_string()]);
    }

    #[test]
    fn test_hang_up_right_after_upgrade_closes_after_trailer() {
        // Arrange: the peer hangs up while the HTTP exchange still owns the
        // connection, just after a text frame following the 101 head.
        let (session, key) = started_session();
        let seen = Arc::new(Seen::default());
        session.set_delegates(delegates(&seen));
        let lower = Arc::new(FakeConnection::default());
        let (router, mut events) = Router::new();
        let (on_data, on_broken) = router.delegates();
        lower.process(on_data, on_broken).unwrap();
        lower.hang_up(true);
        let mut trailer = Server::new().frame(Message::Text("early".to_string()));
        trailer.extend(router.hold(&mut events));
        let upgraded: Arc<dyn NetworkConnection> =
            Arc::new(UpgradedConnection::new(Arc::clone(&lower) as _, router));
        let response = upgrade_response(&derive_accept_key(key.as_bytes()));

        // Act
        let engaged = session.finish_open_as_client(upgraded, &response, &trailer);

        // Assert
        assert!(engaged);
        assert_eq!(*seen.texts.lock().unwrap(), vec!["early".to_string()]);
        assert_eq!(
            *seen.closes.lock().unwrap(),
            vec![(CLOSE_CODE_ABNORMAL, "connection closed by peer".to_string())]
        );
    }

    #[test]
    fn test_frame_split_across_deliveries_is_reassembled() {
        let (_session, connection, seen) = engaged(b"");
        let mut server = Server::new();
        let frame = server.frame(Message::Text("split".to_string()));

        connection.deliver(&frame[..3]);
        assert!(seen.texts.lock().unwrap().is_empty());
        connection.deliver(&frame[3..]);

        assert_eq!(*seen.texts.lock().unwrap(), vec!["split".to_string()]);
    }

    #[test]
    fn test_send_text_produces_client_frame() {
        // Arrange
        let (session, connection, _seen) = engaged(b"");
        let mut server = Server::new();

        // Act
        session.send_text("hi");

        // Assert
        let messages = server.read(&connection.take_sent());
        assert_eq!(messages, vec![Message::Text("hi".to_string())]);
    }

    #[test]
    fn test_ping_reaches_delegate_and_is_answered() {
        let (_session, connection, seen) = engaged(b"");
        let mut server = Server::new();

        connection.deliver(&server.frame(Message::Ping(b"tick".to_vec())));

        assert_eq!(*seen.pings.lock().unwrap(), vec![b"tick".to_vec()]);
        let messages = server.read(&connection.take_sent());
        assert_eq!(messages, vec![Message::Pong(b"tick".to_vec())]);
    }

    #[test]
    fn test_close_handshake_reports_server_reply() {
        // Arrange
        let (session, connection, seen) = engaged(b"");
        let mut server = Server::new();

        // Act: we close, the server reads our frame and echoes it.
        session.close(1000, "Kthxbye");
        let messages = server.read(&connection.take_sent());
        connection.deliver(&server.take_outgoing());

        // Assert
        assert!(matches!(
            messages.first(),
            Some(Message::Close(Some(frame))) if u16::from(frame.code) == 1000 && frame.reason == "Kthxbye"
        ));
        assert_eq!(
            *seen.closes.lock().unwrap(),
            vec![(1000, "Kthxbye".to_string())]
        );
        assert_eq!(*connection.closed.lock().unwrap(), Some(true));
    }

    #[test]
    fn test_server_initiated_close_is_reported_and_answered() {
        let (_session, connection, seen) = engaged(b"");
        let mut server = Server::new();
        server
            .context
            .close(
                &mut server.bridge,
                Some(CloseFrame {
                    code: CloseCode::Away,
                    reason: Cow::Borrowed("bye"),
                }),
            )
            .unwrap();

        connection.deliver(&server.take_outgoing());

        assert_eq!(*seen.closes.lock().unwrap(), vec![(1001, "bye".to_string())]);
        let reply = server.read(&connection.take_sent());
        assert!(matches!(reply.first(), Some(Message::Close(_))));
    }

    #[test]
    fn test_abrupt_break_reports_abnormal_closure_once() {
        let (_session, connection, seen) = engaged(b"");

        connection.hang_up(false);
        connection.hang_up(false);

        let closes = seen.closes.lock().unwrap();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].0, CLOSE_CODE_ABNORMAL);
    }

    #[test]
    fn test_send_before_engage_is_ignored() {
        let session = WebSocketSession::new();
        session.send_text("nobody listening");
        session.close(1000, "");
    }

    #[test]
    fn test_drop_before_close_closes_connection_uncleanly() {
        let (session, connection, _seen) = engaged(b"");
        drop(session);
        assert_eq!(*connection.closed.lock().unwrap(), Some(false));
    }
}
