use common::ErrorKind;
use thiserror::Error;

/// Boxed error returned by message handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur when interacting with queues and topics.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The handler rejected a message. The message was requeued or dead-lettered.
    #[error("Handler failed for message {message_id} (delivery {delivery_count}): {source}")]
    Handler {
        message_id: String,
        delivery_count: u32,
        #[source]
        source: HandlerError,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MessagingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MessagingError::Handler { .. }
            | MessagingError::Database(_)
            | MessagingError::Migration(_)
            | MessagingError::Serialization(_) => ErrorKind::Unexpected,
        }
    }
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
