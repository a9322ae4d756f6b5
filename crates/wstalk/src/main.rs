//! wstalk: interactive WebSocket client, entry point.
//!
//! Connects to a WebSocket server, sends each line typed on the console as a
//! text message, and logs everything the server sends back.  With hex
//! dumps enabled (the default) every byte crossing the connection is traced
//! twice for secure URLs: as ciphertext ("Wire") and as plaintext ("TLS").
//!
//! # Usage
//!
//! ```text
//! wstalk [OPTIONS] <URL>
//!
//! Options:
//!   --cert <FILE>        Extra trusted certificate (PEM); may be repeated
//!   --config <FILE>      TOML settings file
//!   --no-hex-dump        Do not trace traffic as hex dumps
//!   --min-level <N>      Lowest diagnostics level to log
//! ```
//!
//! Root CA certificates are read from `cert.pem` in the same directory as
//! the executable.
//!
//! # Environment variable overrides
//!
//! | Variable             | Description                         |
//! |----------------------|-------------------------------------|
//! | `WSTALK_CONFIG`      | Settings file path                  |
//! | `WSTALK_NO_HEX_DUMP` | Disable hex dumps (`true`/`false`)  |
//! | `WSTALK_MIN_LEVEL`   | Lowest diagnostics level to log     |
//! | `RUST_LOG`           | `tracing` filter (default `info`)   |

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::BufReader;
use tokio_tungstenite::tungstenite::http::Uri;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wstalk::application::client_lifecycle::SOURCE;
use wstalk::application::{ClientLifecycle, ShutdownFlag};
use wstalk::domain::ClientConfig;
use wstalk::infrastructure::build_client_stack;
use wstalk::infrastructure::storage::{load_ca_bundle, load_settings, root_ca_path};
use wstalk_core::compose::is_secure_scheme;
use wstalk_core::diagnostics::tracing_delegate;
use wstalk_core::{levels, DiagnosticsSender};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Interactive WebSocket client with hex-dump tracing.
#[derive(Debug, Parser)]
#[command(
    name = "wstalk",
    about = "Talk to a WebSocket server from the console",
    version
)]
struct Cli {
    /// WebSocket URL, e.g. `wss://echo.example.com/`.
    ///
    /// Collected as a list so that "no URL" and "several URLs" get their own
    /// error messages.
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Extra trusted certificate file (PEM), appended to `cert.pem`.
    #[arg(long = "cert", value_name = "FILE")]
    certs: Vec<PathBuf>,

    /// TOML settings file (timeouts, hex dump, minimum level).
    #[arg(long, value_name = "FILE", env = "WSTALK_CONFIG")]
    config: Option<PathBuf>,

    /// Do not stack hex-dump decorators around the connection.
    #[arg(long, env = "WSTALK_NO_HEX_DUMP")]
    no_hex_dump: bool,

    /// Lowest diagnostics level written to the log (0 = everything).
    #[arg(long, value_name = "N", env = "WSTALK_MIN_LEVEL")]
    min_level: Option<usize>,
}

impl Cli {
    /// Converts the parsed arguments into a [`ClientConfig`], reading the
    /// settings file and certificates they name.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing, repeated, or unusable URL, and for
    /// any settings or certificate file that cannot be read.
    fn into_client_config(self) -> anyhow::Result<ClientConfig> {
        let root = root_ca_path()?;
        self.into_client_config_with_root(&root)
    }

    fn into_client_config_with_root(self, root_ca: &Path) -> anyhow::Result<ClientConfig> {
        let url = match self.urls.as_slice() {
            [] => bail!("no URL given"),
            [url] => url,
            _ => bail!("multiple URLs given"),
        };
        let url: Uri = url.parse().context("bad URL given")?;
        if url.host().map_or(true, str::is_empty) {
            bail!("bad URL given");
        }
        let scheme = url.scheme_str().unwrap_or_default().to_ascii_lowercase();
        let Some(secure) = is_secure_scheme(&scheme) else {
            bail!("unsupported URL scheme '{scheme}'");
        };

        let mut config = ClientConfig::new(url);
        if let Some(path) = &self.config {
            load_settings(path)
                .with_context(|| format!("unable to load settings from '{}'", path.display()))?
                .apply_to(&mut config);
        }
        if self.no_hex_dump {
            config.hex_dump = false;
        }
        if let Some(level) = self.min_level {
            config.min_level = level;
        }
        if secure {
            config.ca_certs = load_ca_bundle(root_ca, &self.certs)?;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised, writing to stderr and filtered by
///    `RUST_LOG` (default `info`).
/// 2. CLI arguments, the settings file and certificates become a
///    [`ClientConfig`]; any problem here exits before connecting.
/// 3. The connection stack is built and its diagnostics routed to the log.
/// 4. A Ctrl+C handler sets the [`ShutdownFlag`].
/// 5. [`ClientLifecycle::run`] connects, converses over stdin, and closes.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_client_config()?;

    let diagnostics = DiagnosticsSender::new(SOURCE);
    let _log = diagnostics.subscribe(tracing_delegate(), config.min_level);
    let stack = build_client_stack(&config, &diagnostics);

    let shutdown = ShutdownFlag::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C");
                interrupt.set();
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let mut lifecycle = ClientLifecycle::new(
        config,
        stack.exchange,
        stack.session,
        diagnostics.clone(),
        shutdown,
    );
    let result = lifecycle.run(BufReader::new(tokio::io::stdin())).await;
    diagnostics.send(levels::INFO, "Exiting.");
    drop(lifecycle);
    stack.subscription.unsubscribe();

    result.context("WebSocket session did not open")?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
