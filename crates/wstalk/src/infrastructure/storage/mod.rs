//! Files read at startup: the settings file and trusted certificates.

pub mod certs;
pub mod settings;

pub use certs::{load_ca_bundle, root_ca_path, ROOT_CA_FILE};
pub use settings::{load_settings, ConfigError, Settings};
