//! Optional TOML settings file.
//!
//! Every field has a default, so a missing field (or a missing file, when
//! no `--config` is given) leaves the built-in behaviour unchanged.
//!
//! ```toml
//! request_poll_interval_secs = 5
//! request_timeout_secs = 30
//! close_timeout_ms = 1000
//! hex_dump = true
//! min_level = 0
//! ```
//!
//! # Serde default values (for beginners)
//!
//! `#[serde(default = "some_fn")]` tells serde to call `some_fn()` when the
//! field is absent from the file.  The same functions feed the `Default`
//! impl, so the file and the code can never disagree about a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wstalk_core::levels;

use crate::domain::ClientConfig;

/// Floor for the request poll interval; zero would spin.
const MIN_REQUEST_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Error type for loading settings or certificate files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file could not be read.
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The root CA bundle next to the executable could not be read.
    #[error("unable to open root CA certificates file '{0}'")]
    RootCertificates(PathBuf),

    /// A `--cert` file could not be read.
    #[error("unable to open certificate file '{0}'")]
    Certificate(PathBuf),
}

/// Tunables read from the settings file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Seconds per wait on the upgrade transaction between shutdown checks.
    #[serde(default = "default_request_poll_interval_secs")]
    pub request_poll_interval_secs: u64,
    /// Seconds before the upgrade exchange gives up.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Milliseconds to wait for the server to acknowledge our close.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    /// Whether to trace traffic as hex dumps.
    #[serde(default = "default_true")]
    pub hex_dump: bool,
    /// Lowest diagnostics level written to the log.
    #[serde(default = "default_min_level")]
    pub min_level: usize,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_request_poll_interval_secs() -> u64 {
    5
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_close_timeout_ms() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}
fn default_min_level() -> usize {
    levels::DEBUG
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_poll_interval_secs: default_request_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            close_timeout_ms: default_close_timeout_ms(),
            hex_dump: default_true(),
            min_level: default_min_level(),
        }
    }
}

impl Settings {
    /// Copies these settings into `config`.  A zero poll interval becomes
    /// one millisecond.
    pub fn apply_to(&self, config: &mut ClientConfig) {
        config.request_poll_interval =
            Duration::from_secs(self.request_poll_interval_secs).max(MIN_REQUEST_POLL_INTERVAL);
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        config.close_timeout = Duration::from_millis(self.close_timeout_ms);
        config.hex_dump = self.hex_dump;
        config.min_level = self.min_level;
    }
}

/// Loads settings from `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
