use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of a message within a topic partition.
///
/// Offsets start at 0 for the first message and increment by 1 for each
/// subsequent message on the partition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(i64);

impl Offset {
    /// Creates an offset from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the offset of the first message in a partition.
    pub fn first() -> Self {
        Self(0)
    }

    /// Returns the next offset.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw offset value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Offset> for i64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

/// A message read back from a topic partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was published to.
    pub topic: String,

    /// Partition within the topic (always 0).
    pub partition: i32,

    /// Position of the message in the partition.
    pub offset: Offset,

    /// Routing key, selecting the stage handler together with the topic.
    pub key: String,

    /// Raw payload bytes.
    pub payload: Vec<u8>,

    /// When the broker accepted the message.
    pub timestamp: DateTime<Utc>,
}

impl BusMessage {
    /// Returns the payload as UTF-8 text for logging, lossy on invalid bytes.
    pub fn payload_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}
