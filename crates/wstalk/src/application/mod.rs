//! Application layer for the wstalk client.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure types) and the infrastructure (sockets, TLS, console).  It decides
//! *what happens when*, and reaches the outside world only through traits.
//!
//! # Sub-modules
//!
//! - **`upgrade`** – The traits the orchestrator drives: the HTTP upgrade
//!   exchange ([`upgrade::UpgradeExchange`] / [`upgrade::Transaction`]) and
//!   the upgraded-protocol session ([`upgrade::UpgradeSession`]).
//!
//! - **`client_lifecycle`** – [`client_lifecycle::ClientLifecycle`], which
//!   connects, runs the interactive loop, and performs the bounded close
//!   handshake.

pub mod client_lifecycle;
pub mod upgrade;

pub use client_lifecycle::{ClientLifecycle, CloseSignal, ShutdownFlag};
