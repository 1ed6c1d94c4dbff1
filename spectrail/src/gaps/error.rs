//! Error types for location and gap loading.

use thiserror::Error;

/// Errors that can occur while loading a location's range or gap list.
#[derive(Debug, Error)]
pub enum GapModelError {
    /// Transport-level failure talking to the location service.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The location service answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The source has no record of this location.
    #[error("Unknown location: {0}")]
    UnknownLocation(String),

    /// The location's range is empty or inverted.
    #[error("Invalid range for {location}: {min_time} >= {max_time}")]
    InvalidRange {
        location: String,
        min_time: f64,
        max_time: f64,
    },

    /// I/O failure reading a location file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for GapModelError {
    fn from(e: serde_json::Error) -> Self {
        GapModelError::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for GapModelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GapModelError::Decode(e.to_string())
        } else {
            GapModelError::Http(e.to_string())
        }
    }
}
