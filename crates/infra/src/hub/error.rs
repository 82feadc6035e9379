use thiserror::Error;

/// Durable store failure.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),
    /// A unique index rejected the write.
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("record serialization failed: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors surfaced by [`HubMessageProcessor`](super::HubMessageProcessor).
///
/// Handler failures are not represented here; they turn into a reschedule or
/// dead-letter record instead of an error.
#[derive(Debug, Error)]
pub enum HubError {
    /// `handle_processing` ran before the durable stores were connected.
    #[error("consumer is not initialized yet")]
    NotInitialized,

    #[error("message handler not found for message type `{message_type}`")]
    HandlerNotFound { message_type: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
