//! Error types for the stream shard consumer library.

use thiserror::Error;

/// Result type alias for consumer operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Failures reported by the stream service through a [`crate::StreamClient`].
///
/// The variants mirror the service error kinds the consumer reacts to differently:
/// throttling and expired cursors are recovered locally, everything else is fatal.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Request rate limit exceeded (LimitExceeded / ProvisionedThroughputExceeded)
    #[error("Throttled: {0}")]
    Throttled(String),

    /// The shard iterator is older than the service retention window for cursors
    #[error("Shard iterator expired: {0}")]
    CursorExpired(String),

    /// Stream or shard does not exist
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// The requested starting position is not valid for this shard
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Any other transport or service failure
    #[error("Stream client error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Failure to turn a raw record into the consumer's item type.
#[derive(Error, Debug)]
#[error("Failed to deserialize record {sequence_number} from shard {shard_id}: {source}")]
pub struct DecodeError {
    pub shard_id: String,
    pub sequence_number: String,
    #[source]
    pub source: anyhow::Error,
}

/// Errors surfaced by discovery and shard consumption.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Stream or shard is gone; consumption of it must stop
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Cursor acquisition rejected the starting position
    #[error("Invalid starting position: {0}")]
    InvalidPosition(String),

    /// Configuration rejected at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A configured retry bound was exceeded for a throttled operation
    #[error("Retries exhausted for {operation} after {attempts} attempts")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
    },

    /// Record deserialization failed
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The output sink no longer accepts records
    #[error("Record sink closed")]
    SinkClosed,

    /// Unclassified stream client failure
    #[error("Stream client error: {0}")]
    Client(#[source] anyhow::Error),
}

impl ConsumerError {
    /// Map a client failure that the caller does not recover from locally.
    pub(crate) fn from_client(err: ClientError) -> Self {
        match err {
            ClientError::ResourceNotFound(msg) => ConsumerError::ResourceNotFound(msg),
            ClientError::InvalidPosition(msg) => ConsumerError::InvalidPosition(msg),
            ClientError::Throttled(msg) | ClientError::CursorExpired(msg) => {
                ConsumerError::Client(anyhow::anyhow!(msg))
            }
            ClientError::Other(e) => ConsumerError::Client(e),
        }
    }

    /// Check if the error is fatal for the shard (never worth retrying as-is)
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ConsumerError::RetriesExhausted { .. })
    }
}
