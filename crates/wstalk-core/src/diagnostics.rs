//! Diagnostics publisher: a tiny publish/subscribe hub for diagnostic lines.
//!
//! Every component that has something to say (a connection, the TLS layer,
//! the lifecycle orchestrator) owns a [`DiagnosticsSender`] named after
//! itself.  Interested parties subscribe a [`DiagnosticDelegate`] with a
//! minimum severity; every published line at or above that level is handed
//! to the delegate as `(source, level, message)`.
//!
//! # Why not call `tracing` directly everywhere? (for beginners)
//!
//! The hex-dump decorators must route their output through the exact
//! delegate they were configured with, so that a test (or a different front
//! end) can capture the lines.  The publisher keeps that routing explicit.
//! The binary then bridges everything into `tracing` with
//! [`tracing_delegate`], so the log output still goes through the usual
//! `tracing-subscriber` pipeline and honours `RUST_LOG`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Severity levels for diagnostic lines.  Higher is more severe.
pub mod levels {
    /// Chatty protocol events such as pings.
    pub const DEBUG: usize = 0;
    /// Application payload traffic (text messages sent and received).
    pub const DETAIL: usize = 1;
    /// Lifecycle progress and hex-dump lines.
    pub const INFO: usize = 3;
    /// Something unusual that is not a failure (e.g. a canceled request).
    pub const WARNING: usize = 5;
    /// A failure.
    pub const ERROR: usize = 10;
}

/// Receives one diagnostic line: `(source label, severity level, message)`.
pub type DiagnosticDelegate = Arc<dyn Fn(&str, usize, &str) + Send + Sync>;

struct Subscriber {
    id: u64,
    min_level: usize,
    delegate: DiagnosticDelegate,
}

struct Shared {
    name: String,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl Shared {
    fn publish(&self, source: &str, level: usize, message: &str) {
        // Snapshot the matching delegates so a delegate may subscribe or
        // unsubscribe without deadlocking on our own lock.
        let delegates: Vec<DiagnosticDelegate> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| level >= s.min_level)
            .map(|s| Arc::clone(&s.delegate))
            .collect();
        for delegate in delegates {
            delegate(source, level, message);
        }
    }

    fn remove(&self, id: u64) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| s.id != id);
    }
}

/// Publishes diagnostic lines to any number of subscribers.
///
/// Cloning a sender is cheap and yields a handle to the same subscriber list.
#[derive(Clone)]
pub struct DiagnosticsSender {
    shared: Arc<Shared>,
}

impl DiagnosticsSender {
    /// Creates a sender whose lines are labelled with `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the source label attached to every line this sender publishes.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Registers `delegate` to receive every line at or above `min_level`.
    pub fn subscribe(&self, delegate: DiagnosticDelegate, min_level: usize) -> Subscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                min_level,
                delegate,
            });
        Subscription {
            entries: vec![(Arc::downgrade(&self.shared), id)],
        }
    }

    /// Returns the lowest minimum level among current subscribers, or
    /// `usize::MAX` when nobody is listening.
    pub fn min_level(&self) -> usize {
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.min_level)
            .min()
            .unwrap_or(usize::MAX)
    }

    /// Publishes `message` at `level` under this sender's name.
    pub fn send(&self, level: usize, message: impl AsRef<str>) {
        self.shared
            .publish(&self.shared.name, level, message.as_ref());
    }

    /// Returns a delegate that republishes lines from another sender through
    /// this one, keeping the original source label.
    ///
    /// The delegate holds only a weak reference, so chaining never keeps a
    /// sender alive.
    pub fn chain(&self) -> DiagnosticDelegate {
        let weak = Arc::downgrade(&self.shared);
        Arc::new(move |source: &str, level: usize, message: &str| {
            if let Some(shared) = weak.upgrade() {
                shared.publish(source, level, message);
            }
        })
    }
}

impl fmt::Debug for DiagnosticsSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticsSender")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

/// Token returned by a subscription; call [`Subscription::unsubscribe`] to
/// stop receiving lines.
///
/// Dropping the token does *not* unsubscribe.  Subscriptions made through a
/// decorator may span several senders, so tokens can be [`join`]ed.
///
/// [`join`]: Subscription::join
#[derive(Default)]
pub struct Subscription {
    entries: Vec<(Weak<Shared>, u64)>,
}

impl Subscription {
    /// A token that unsubscribes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Combines two tokens so that one `unsubscribe` call releases both.
    pub fn join(mut self, other: Subscription) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Removes every subscription this token stands for.  Senders that no
    /// longer exist are skipped.
    pub fn unsubscribe(self) {
        for (weak, id) in self.entries {
            if let Some(shared) = weak.upgrade() {
                shared.remove(id);
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Returns a delegate that forwards diagnostic lines into `tracing`.
///
/// | level            | tracing event |
/// |------------------|---------------|
/// | `>= ERROR`       | `error!`      |
/// | `>= WARNING`     | `warn!`       |
/// | `>= DETAIL`      | `info!`       |
/// | otherwise        | `debug!`      |
pub fn tracing_delegate() -> DiagnosticDelegate {
    Arc::new(|source: &str, level: usize, message: &str| {
        if level >= levels::ERROR {
            tracing::error!(%source, level, "{message}");
        } else if level >= levels::WARNING {
            tracing::warn!(%source, level, "{message}");
        } else if level >= levels::DETAIL {
            tracing::info!(%source, level, "{message}");
        } else {
            tracing::debug!(%source, level, "{message}");
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
