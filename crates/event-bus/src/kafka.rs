//! Kafka adapter for [`EventBus`].
//!
//! Each topic is expected to have a single partition. Consumers are assigned
//! to partition 0 at an explicit offset and never commit to Kafka; the
//! offset store is the source of truth for consumption progress.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset as KafkaOffset, TopicPartitionList};

use crate::{BusError, BusMessage, EventBus, MessageStream, Offset, Result};

/// Configuration for the Kafka connection.
#[derive(Clone, Debug)]
pub struct KafkaBusConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// How long a send may wait for acknowledgement.
    pub send_timeout: Duration,
    /// How long metadata and watermark queries may take.
    pub metadata_timeout: Duration,
}

impl KafkaBusConfig {
    /// Creates a config for an unauthenticated cluster.
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            sasl_username: None,
            sasl_password: None,
            send_timeout: Duration::from_secs(5),
            metadata_timeout: Duration::from_secs(10),
        }
    }

    /// Adds SASL/PLAIN credentials over TLS.
    pub fn with_sasl(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.sasl_username = Some(username.into());
        self.sasl_password = Some(password.into());
        self
    }

    fn base_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);

        if let (Some(username), Some(password)) = (&self.sasl_username, &self.sasl_password) {
            config.set("security.protocol", "SASL_SSL");
            config.set("sasl.mechanism", "PLAIN");
            config.set("sasl.username", username);
            config.set("sasl.password", password);
        }
        config
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = self.base_config();
        config.set("acks", "all");
        config.set(
            "message.timeout.ms",
            self.send_timeout.as_millis().to_string(),
        );
        config
    }

    fn consumer_config(&self) -> ClientConfig {
        let mut config = self.base_config();
        // A group id is mandatory for librdkafka consumers even with manual assignment.
        config.set("group.id", "shop-saga-cursor");
        config.set("enable.auto.commit", "false");
        config.set("enable.auto.offset.store", "false");
        config.set("enable.partition.eof", "false");
        config
    }
}

/// Kafka-backed bus.
pub struct KafkaBus {
    producer: FutureProducer,
    config: KafkaBusConfig,
}

impl KafkaBus {
    /// Connects a producer to the cluster.
    pub fn new(config: KafkaBusConfig) -> Result<Self> {
        let producer: FutureProducer = config
            .producer_config()
            .create()
            .map_err(|e| BusError::Unavailable(format!("failed to create Kafka producer: {e}")))?;

        tracing::info!(bootstrap_servers = %config.bootstrap_servers, "connected to Kafka");

        Ok(Self { producer, config })
    }
}

#[async_trait]
impl EventBus for KafkaBus {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<Offset> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, self.config.send_timeout).await {
            Ok((partition, offset)) => {
                metrics::counter!("bus_messages_published_total", "topic" => topic.to_string())
                    .increment(1);
                tracing::debug!(topic, key, partition, offset, "message published");
                Ok(Offset::new(offset))
            }
            Err((e, _)) => Err(BusError::NotAcknowledged(e.to_string())),
        }
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

        let consumer: StreamConsumer = self
            .config
            .consumer_config()
            .create()
            .map_err(|e| BusError::Unavailable(format!("failed to create Kafka consumer: {e}")))?;

        let (low, high) = consumer
            .fetch_watermarks(topic, partition, self.config.metadata_timeout)
            .map_err(|e| BusError::Unavailable(e.to_string()))?;

        if start.as_i64() < low || start.as_i64() > high {
            return Err(BusError::OffsetOutOfRange {
                topic: topic.to_string(),
                requested: start,
                low: Offset::new(low),
                high: Offset::new(high),
            });
        }

        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(topic, partition, KafkaOffset::Offset(start.as_i64()))
            .map_err(|e| BusError::Transport(e.to_string()))?;
        consumer
            .assign(&assignment)
            .map_err(|e| BusError::Transport(e.to_string()))?;

        tracing::info!(topic, partition, %start, "Kafka consumer assigned");

        let consumer = Arc::new(consumer);
        let stream = futures_util::stream::unfold(consumer, |consumer| async move {
            let item = match consumer.recv().await {
                Ok(message) => Ok(BusMessage {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: Offset::new(message.offset()),
                    key: message
                        .key()
                        .map(|k| String::from_utf8_lossy(k).into_owned())
                        .unwrap_or_default(),
                    payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                    timestamp: message
                        .timestamp()
                        .to_millis()
                        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                        .unwrap_or_else(Utc::now),
                }),
                Err(e) => Err(BusError::Transport(e.to_string())),
            };
            Some((item, consumer))
        });

        Ok(Box::pin(stream))
    }
}
