//! Dead-letter sinks for messages that cannot be processed or published.
//!
//! Two things end up here: poison messages a consumer could not decode or
//! route (the cursor still advances past them), and publishes that exhausted
//! their retry budget, most importantly compensations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_bus::{BusMessage, EventBus, Offset};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::messages::StageMessage;
use crate::topics::dead_letter_topic;

/// A message set aside for manual review and replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Service that gave up on the message.
    pub service: String,
    pub topic: String,
    pub key: String,
    /// Offset the message was read at; `None` for publishes that never landed.
    pub offset: Option<Offset>,
    /// Payload as UTF-8, lossily decoded.
    pub payload: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    /// A consumed message that could not be processed.
    pub fn consumed(service: &str, message: &BusMessage, reason: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            topic: message.topic.clone(),
            key: message.key.clone(),
            offset: Some(message.offset),
            payload: message.payload_text().into_owned(),
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }

    /// An outgoing message whose publish failed after every retry.
    pub fn unpublished(service: &str, message: &StageMessage, reason: impl Into<String>) -> Self {
        let (topic, key) = message.route();
        let payload = message
            .encode()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        Self {
            service: service.to_string(),
            topic: topic.to_string(),
            key: key.to_string(),
            offset: None,
            payload,
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }
}

/// Destination for dead letters.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, letter: DeadLetter) -> Result<()>;
}

#[async_trait]
impl<T: DeadLetterSink + ?Sized> DeadLetterSink for Arc<T> {
    async fn send(&self, letter: DeadLetter) -> Result<()> {
        (**self).send(letter).await
    }
}

/// Hands `letter` to `sink`, logging and counting it. A sink failure is
/// logged; there is nowhere further to send the letter.
pub async fn dead_letter<D: DeadLetterSink + ?Sized>(sink: &D, letter: DeadLetter) {
    tracing::error!(
        service = %letter.service,
        topic = %letter.topic,
        key = %letter.key,
        offset = ?letter.offset,
        reason = %letter.reason,
        "Message dead-lettered"
    );
    metrics::counter!(
        "stage_messages_dead_lettered_total",
        "service" => letter.service.clone(),
        "topic" => letter.topic.clone()
    )
    .increment(1);

    if let Err(e) = sink.send(letter).await {
        tracing::error!(error = %e, "Dead-letter sink failed, letter lost");
    }
}

/// Keeps dead letters in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetterSink {
    letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn letters(&self) -> Vec<DeadLetter> {
        self.letters.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.letters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.letters.read().await.is_empty()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterSink {
    async fn send(&self, letter: DeadLetter) -> Result<()> {
        self.letters.write().await.push(letter);
        Ok(())
    }
}

/// Publishes dead letters as JSON to `<topic>.dlq` on the bus.
pub struct BusDeadLetterSink<B: EventBus + ?Sized> {
    bus: Arc<B>,
}

impl<B: EventBus + ?Sized> BusDeadLetterSink<B> {
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl<B: EventBus + ?Sized> DeadLetterSink for BusDeadLetterSink<B> {
    async fn send(&self, letter: DeadLetter) -> Result<()> {
        let payload = serde_json::to_vec(&letter)?;
        self.bus
            .publish(&dead_letter_topic(&letter.topic), &letter.key, &payload)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::InMemoryBus;

    fn poison() -> BusMessage {
        BusMessage {
            topic: "player".into(),
            partition: 0,
            offset: Offset::new(7),
            key: "buy".into(),
            payload: b"not json".to_vec(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_sink_collects_letters() {
        let sink = InMemoryDeadLetterSink::new();
        dead_letter(&sink, DeadLetter::consumed("player", &poison(), "malformed")).await;

        let letters = sink.letters().await;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].offset, Some(Offset::new(7)));
        assert_eq!(letters[0].payload, "not json");
        assert_eq!(letters[0].reason, "malformed");
    }

    #[tokio::test]
    async fn bus_sink_publishes_to_dlq_topic() {
        let bus = Arc::new(InMemoryBus::new());
        let sink = BusDeadLetterSink::new(Arc::clone(&bus));

        sink.send(DeadLetter::consumed("player", &poison(), "malformed"))
            .await
            .unwrap();

        let messages = bus.messages("player.dlq").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, "buy");
        let letter: DeadLetter = serde_json::from_slice(&messages[0].payload).unwrap();
        assert_eq!(letter.topic, "player");
        assert_eq!(letter.service, "player");
    }
}
