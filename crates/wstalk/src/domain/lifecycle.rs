//! Client lifecycle states.
//!
//! ```text
//! Idle ─► Connecting ─► AwaitingUpgrade ─► Established ─► ClosingLocal ─► Closed
//!              │               │
//!              └───────┬───────┘
//!                      ▼
//!              Failed(ConnectFailure)
//! ```
//!
//! `Closed` and `Failed` are terminal.

use std::fmt;

use thiserror::Error;
use wstalk_core::levels;

/// Why a connection attempt ended before the WebSocket was established.
///
/// The `Display` text of each variant is the exact diagnostic line published
/// when the attempt fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectFailure {
    /// The transport could not reach the server.
    #[error("unable to connect")]
    UnableToConnect,

    /// The server hung up before a complete response arrived.
    #[error("connection broken by server")]
    Broken,

    /// No complete response arrived within the request timeout.
    #[error("timeout waiting for response")]
    Timeout,

    /// The server answered with something other than `101 Switching
    /// Protocols`.
    #[error("Got back response: {status} {reason}")]
    Refused { status: u16, reason: String },

    /// The server answered `101` but the WebSocket session could not be
    /// engaged on the connection (bad headers or accept key).
    #[error("Connection upgraded, but failed to engage WebSocket")]
    NotEngaged,

    /// The user asked to shut down while the upgrade was still pending.
    #[error("Fetch Canceled")]
    Canceled,
}

impl ConnectFailure {
    /// Diagnostics level at which this failure is published.
    ///
    /// Cancellation is the user's own request, so it is only a warning.
    pub fn level(&self) -> usize {
        match self {
            ConnectFailure::Canceled => levels::WARNING,
            _ => levels::ERROR,
        }
    }
}

/// Where the client is in its connect / talk / close lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing has happened yet.
    Idle,
    /// The upgrade request is being issued.
    Connecting,
    /// The request is out; waiting for the transaction to complete.
    AwaitingUpgrade,
    /// The WebSocket is open and the interactive loop is running.
    Established,
    /// Our close frame is sent; waiting for the server's acknowledgment.
    ClosingLocal,
    /// The session and its connection have been released.
    Closed,
    /// The connection attempt ended without an established WebSocket.
    Failed(ConnectFailure),
}

impl LifecycleState {
    /// Whether no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Closed | LifecycleState::Failed(_))
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => f.write_str("idle"),
            LifecycleState::Connecting => f.write_str("connecting"),
            LifecycleState::AwaitingUpgrade => f.write_str("awaiting upgrade"),
            LifecycleState::Established => f.write_str("established"),
            LifecycleState::ClosingLocal => f.write_str("closing"),
            LifecycleState::Closed => f.write_str("closed"),
            LifecycleState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_messages_match_published_lines() {
        assert_eq!(ConnectFailure::UnableToConnect.to_string(), "unable to connect");
        assert_eq!(ConnectFailure::Broken.to_string(), "connection broken by server");
        assert_eq!(ConnectFailure::Timeout.to_string(), "timeout waiting for response");
        assert_eq!(
            ConnectFailure::NotEngaged.to_string(),
            "Connection upgraded, but failed to engage WebSocket"
        );
        assert_eq!(ConnectFailure::Canceled.to_string(), "Fetch Canceled");
    }

    #[test]
    fn test_refused_includes_status_and_reason() {
        // Arrange
        let failure = ConnectFailure::Refused {
            status: 404,
            reason: "Not Found".to_string(),
        };
        // Act / Assert
        assert_eq!(failure.to_string(), "Got back response: 404 Not Found");
    }

    #[test]
    fn test_cancel_is_a_warning_everything_else_an_error() {
        assert_eq!(ConnectFailure::Canceled.level(), levels::WARNING);
        assert_eq!(ConnectFailure::Timeout.level(), levels::ERROR);
        assert_eq!(ConnectFailure::NotEngaged.level(), levels::ERROR);
    }

    #[test]
    fn test_only_closed_and_failed_are_terminal() {
        assert!(LifecycleState::Closed.is_terminal());
        assert!(LifecycleState::Failed(ConnectFailure::Broken).is_terminal());
        assert!(!LifecycleState::Idle.is_terminal());
        assert!(!LifecycleState::Established.is_terminal());
        assert!(!LifecycleState::ClosingLocal.is_terminal());
    }

    #[test]
    fn test_failed_state_displays_reason() {
        let state = LifecycleState::Failed(ConnectFailure::Timeout);
        assert_eq!(state.to_string(), "failed (timeout waiting for response)");
    }
}
