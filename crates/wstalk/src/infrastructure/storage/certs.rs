//! Trusted certificate material.
//!
//! The root CA bundle lives in `cert.pem` next to the executable.  Extra
//! certificates named with `--cert` are appended to it, and the whole text
//! is handed to the TLS decorator as one PEM bundle.

use std::path::{Path, PathBuf};

use super::settings::ConfigError;

/// File name of the root CA bundle shipped beside the executable.
pub const ROOT_CA_FILE: &str = "cert.pem";

/// Path of the root CA bundle for the running executable.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the executable path cannot be determined.
pub fn root_ca_path() -> Result<PathBuf, ConfigError> {
    let exe = std::env::current_exe().map_err(|source| ConfigError::Io {
        path: PathBuf::from(ROOT_CA_FILE),
        source,
    })?;
    let dir = exe.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(dir.join(ROOT_CA_FILE))
}

/// Reads `root` and every file in `extras`, concatenated in that order.
///
/// # Errors
///
/// [`ConfigError::RootCertificates`] when `root` cannot be read,
/// [`ConfigError::Certificate`] for the first unreadable extra.
pub fn load_ca_bundle(root: &Path, extras: &[PathBuf]) -> Result<String, ConfigError> {
    let mut bundle = std::fs::read_to_string(root)
        .map_err(|_| ConfigError::RootCertificates(root.to_path_buf()))?;
    for extra in extras {
        let text = std::fs::read_to_string(extra)
            .map_err(|_| ConfigError::Certificate(extra.clone()))?;
        if !bundle.is_empty() && !bundle.ends_with('\n') {
            bundle.push('\n');
        }
        bundle.push_str(&text);
    }
    Ok(bundle)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
