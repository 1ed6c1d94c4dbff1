//! CLI error type.

use thiserror::Error;

use spectrail::config::ConfigError;
use spectrail::gaps::GapModelError;
use spectrail::streamer::FetchError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Location error: {0}")]
    Location(#[from] GapModelError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}
