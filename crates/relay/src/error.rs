//! Relay error types.

use common::ErrorKind;
use messaging::MessagingError;
use thiserror::Error;

/// Errors that can occur while relaying messages or hosting the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The request never got a response.
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The API answered with a non-success status.
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    /// A blocking request task panicked or was cancelled.
    #[error("Relay task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Config(_) => ErrorKind::Validation,
            RelayError::Messaging(e) => e.kind(),
            RelayError::Transport { .. }
            | RelayError::Status { .. }
            | RelayError::Join(_)
            | RelayError::Serialization(_)
            | RelayError::Database(_)
            | RelayError::Metrics(_)
            | RelayError::Io(_) => ErrorKind::Unexpected,
        }
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
