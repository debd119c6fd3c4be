//! Error types for Yieldbird Viewability

use thiserror::Error;

/// Errors surfaced by the fallible loading and parsing APIs.
///
/// The reporter's event path never returns these; faults there are logged and
/// swallowed so the host page keeps running.
#[derive(Debug, Error)]
pub enum ViewabilityError {
    #[error("Failed to parse page event log: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid page event at line {line}: {reason}")]
    InvalidEvent { line: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Cookie jar I/O error: {0}")]
    CookieJarIo(#[from] std::io::Error),

    #[error("Beacon transport error: {0}")]
    Transport(String),

    #[error("Empty page event log")]
    NoEvents,
}
