//! Subcommand implementations.

pub mod config;
pub mod key;
pub mod simulate;

use chrono::DateTime;

use crate::error::CliError;

/// Parse epoch milliseconds or an RFC 3339 timestamp.
pub(crate) fn parse_time(s: &str) -> Result<f64, CliError> {
    if let Ok(ms) = s.trim().parse::<f64>() {
        if ms.is_finite() {
            return Ok(ms);
        }
    }
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.timestamp_millis() as f64)
        .map_err(|e| CliError::InvalidArgument(format!("bad time '{}': {}", s, e)))
}
