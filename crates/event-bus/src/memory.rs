use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, watch};

use crate::{BusError, BusMessage, EventBus, MessageStream, Offset, Result};

/// One topic's single partition.
struct PartitionLog {
    /// Retained messages; `messages[0].offset == low` when non-empty.
    messages: Vec<BusMessage>,
    /// First offset still retained.
    low: Offset,
    /// Broadcasts the high watermark (next offset to be written).
    high: watch::Sender<Offset>,
}

impl PartitionLog {
    fn new() -> Self {
        let (high, _) = watch::channel(Offset::first());
        Self {
            messages: Vec::new(),
            low: Offset::first(),
            high,
        }
    }

    fn high(&self) -> Offset {
        *self.high.borrow()
    }

    fn get(&self, offset: Offset) -> Option<&BusMessage> {
        let index = offset.as_i64() - self.low.as_i64();
        if index < 0 {
            return None;
        }
        self.messages.get(index as usize)
    }
}

/// In-memory append log for tests and the standalone deployment.
///
/// This implementation stores all messages in memory and provides the same
/// interface as the Kafka adapter, including watermark checks on open.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    topics: Arc<RwLock<HashMap<String, PartitionLog>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryBus {
    /// Creates a new bus with no topics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the bus to reject publishes as if the broker were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of messages currently retained on a topic.
    pub async fn message_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|log| log.messages.len())
            .unwrap_or(0)
    }

    /// Returns a snapshot of the retained messages on a topic.
    pub async fn messages(&self, topic: &str) -> Vec<BusMessage> {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Discards every message before `offset`, simulating log compaction.
    pub async fn compact_before(&self, topic: &str, offset: Offset) {
        let mut topics = self.topics.write().await;
        let log = topics
            .entry(topic.to_string())
            .or_insert_with(PartitionLog::new);
        let offset = offset.min(log.high());
        log.messages.retain(|m| m.offset >= offset);
        log.low = offset.max(log.low);
    }
}

struct ConsumerState {
    topics: Arc<RwLock<HashMap<String, PartitionLog>>>,
    topic: String,
    next: Offset,
    high: watch::Receiver<Offset>,
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<Offset> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("in-memory bus marked unavailable".to_string()));
        }

        let mut topics = self.topics.write().await;
        let log = topics
            .entry(topic.to_string())
            .or_insert_with(PartitionLog::new);

        let offset = log.high();
        log.messages.push(BusMessage {
            topic: topic.to_string(),
            partition: 0,
            offset,
            key: key.to_string(),
            payload: payload.to_vec(),
            timestamp: Utc::now(),
        });
        log.high.send_replace(offset.next());

        metrics::counter!("bus_messages_published_total", "topic" => topic.to_string())
            .increment(1);
        tracing::debug!(topic, key, %offset, "message published");

        Ok(offset)
    }

    async fn open_consumer(
        &self,
        topic: &str,
        partition: i32,
        start: Offset,
    ) -> Result<MessageStream> {
        if partition != 0 {
            return Err(BusError::UnknownPartition {
                topic: topic.to_string(),
                partition,
            });
        }

        let high = {
            let mut topics = self.topics.write().await;
            let log = topics
                .entry(topic.to_string())
                .or_insert_with(PartitionLog::new);

            if start < log.low || start > log.high() {
                return Err(BusError::OffsetOutOfRange {
                    topic: topic.to_string(),
                    requested: start,
                    low: log.low,
                    high: log.high(),
                });
            }
            log.high.subscribe()
        };

        let state = ConsumerState {
            topics: Arc::clone(&self.topics),
            topic: topic.to_string(),
            next: start,
            high,
        };

        let stream = futures_util::stream::unfold(state, |mut st| async move {
            loop {
                let high = *st.high.borrow_and_update();
                if st.next < high {
                    let lookup = {
                        let topics = st.topics.read().await;
                        topics
                            .get(&st.topic)
                            .map(|log| (log.get(st.next).cloned(), log.low, log.high()))
                    };
                    let (message, low, high) = lookup?;

                    return match message {
                        Some(message) => {
                            st.next = message.offset.next();
                            Some((Ok(message), st))
                        }
                        None => {
                            // Compacted underneath the consumer; resume at the low watermark.
                            let requested = st.next;
                            st.next = low;
                            Some((
                                Err(BusError::OffsetOutOfRange {
                                    topic: st.topic.clone(),
                                    requested,
                                    low,
                                    high,
                                }),
                                st,
                            ))
                        }
                    };
                }

                if st.high.changed().await.is_err() {
                    return None;
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
