//! Host configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

/// Runtime configuration for the paper registry and its agents.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one subdirectory per paper (default: ./folio_data).
    pub data_dir: PathBuf,
    /// Pending messages kept per peer mailbox (default: 256).
    pub mailbox_capacity: usize,
    /// Queued requests per paper agent channel (default: 64).
    pub request_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./folio_data"),
            mailbox_capacity: 256,
            request_capacity: 64,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables take their defaults; unparseable capacities fall back
    /// to the default rather than failing startup. A capacity of zero is the
    /// one unusable value and is rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();
        let data_dir = env::var("FOLIO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let mailbox_capacity =
            parse_capacity(env::var("FOLIO_MAILBOX_CAPACITY").ok(), defaults.mailbox_capacity)?;
        let request_capacity =
            parse_capacity(env::var("FOLIO_REQUEST_CAPACITY").ok(), defaults.request_capacity)?;

        Ok(Config {
            data_dir,
            mailbox_capacity,
            request_capacity,
        })
    }
}

fn parse_capacity(value: Option<String>, default: usize) -> Result<usize, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(0) => Err(ConfigError::ZeroCapacity),
            Ok(n) => Ok(n),
            Err(_) => Ok(default),
        },
    }
}

/// Unusable configuration values.
#[derive(Debug)]
pub enum ConfigError {
    /// A capacity variable was explicitly set to zero.
    ZeroCapacity,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ZeroCapacity => write!(f, "capacities must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}
