use thiserror::Error;

use crate::Offset;

/// Errors that can occur when talking to the bus or the offset store.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker could not be reached.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The broker did not acknowledge a send.
    #[error("Send not acknowledged: {0}")]
    NotAcknowledged(String),

    /// The requested start offset is no longer (or not yet) in the log.
    #[error(
        "Offset {requested} out of range for topic {topic}: available range is [{low}, {high}]"
    )]
    OffsetOutOfRange {
        topic: String,
        requested: Offset,
        low: Offset,
        high: Offset,
    },

    /// Only partition 0 exists on every topic.
    #[error("Unknown partition {partition} for topic {topic}")]
    UnknownPartition { topic: String, partition: i32 },

    /// A transport-level failure surfaced by an open consumer.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A database error occurred in the offset store.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BusError {
    /// Returns true if the error means the requested offset cannot be served.
    pub fn is_offset_out_of_range(&self) -> bool {
        matches!(self, BusError::OffsetOutOfRange { .. })
    }
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
