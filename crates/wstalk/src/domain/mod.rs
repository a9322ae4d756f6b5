//! Domain layer: configuration and lifecycle types.
//!
//! - **`config`** – [`ClientConfig`], the single source of truth for runtime
//!   settings.
//! - **`lifecycle`** – [`LifecycleState`] and [`ConnectFailure`].

pub mod config;
pub mod lifecycle;

pub use config::ClientConfig;
pub use lifecycle::{ConnectFailure, LifecycleState};
