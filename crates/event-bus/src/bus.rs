use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{BusError, BusMessage, Offset, Result};

/// An ordered stream of messages from one topic partition.
///
/// `Ok` items arrive in offset order. `Err` items carry transport errors
/// surfaced while consuming; the stream keeps going after them.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<BusMessage>> + Send>>;

/// Core trait for the partitioned append log the services talk through.
///
/// Every topic has a single partition (0); ordering within it is total.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a keyed message and waits for the broker's acknowledgement.
    ///
    /// Returns the offset the message was stored at. There is no internal
    /// retry: callers decide whether and how to retry.
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<Offset>;

    /// Opens a consumer positioned at `start` on the given partition.
    ///
    /// Fails with [`BusError::OffsetOutOfRange`](crate::BusError::OffsetOutOfRange)
    /// when `start` has been compacted away or lies beyond the end of the log.
    /// Opening exactly at the end of the log is valid and simply yields
    /// nothing until a new message arrives.
    async fn open_consumer(&self, topic: &str, partition: i32, start: Offset)
    -> Result<MessageStream>;
}

/// Opens a consumer on partition 0 at `start`, rewinding to offset 0 when the
/// requested offset cannot be served.
///
/// If offset 0 itself has been compacted away, consumption starts at the
/// lowest retained offset instead.
pub async fn open_consumer_or_rewind<B: EventBus + ?Sized>(
    bus: &B,
    topic: &str,
    start: Offset,
) -> Result<MessageStream> {
    match bus.open_consumer(topic, 0, start).await {
        Err(e) if e.is_offset_out_of_range() => {
            tracing::warn!(topic, %start, error = %e, "start offset unavailable, rewinding to 0");
            match bus.open_consumer(topic, 0, Offset::first()).await {
                Err(BusError::OffsetOutOfRange { low, .. }) => {
                    tracing::warn!(topic, %low, "offset 0 compacted, starting at low watermark");
                    bus.open_consumer(topic, 0, low).await
                }
                other => other,
            }
        }
        other => other,
    }
}
