//! Error types for corkboard.

use thiserror::Error;

/// Common error type for board operations.
#[derive(Error, Debug)]
pub enum BoardError {
    /// Malformed input, rejected before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transport failure: connect, timeout, or a closed socket.
    #[error("connection error: {0}")]
    Connection(String),

    /// `next()` was called on the last page of a sequence.
    #[error("page sequence exhausted: no next page")]
    Exhausted,

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Non-success HTTP status not covered by another variant.
    #[error("HTTP error {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Wire format encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for BoardError {
    fn from(e: serde_json::Error) -> Self {
        BoardError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for BoardError {
    fn from(e: url::ParseError) -> Self {
        BoardError::Config(format!("invalid URL: {e}"))
    }
}

impl From<reqwest::Error> for BoardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BoardError::Serialization(e.to_string())
        } else if let Some(status) = e.status() {
            BoardError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            BoardError::Connection(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BoardError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BoardError::Connection(e.to_string())
    }
}

/// Result type alias for board operations.
pub type Result<T> = std::result::Result<T, BoardError>;
