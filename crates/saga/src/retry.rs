//! Bounded retry for bus publishes.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use event_bus::{BusError, EventBus, Offset};

use crate::messages::{MessageError, StageMessage};

/// Exponential backoff with jitter and a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1.
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay,
            max_delay,
        }
    }

    /// A single attempt with no retry.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
    }

    /// Publishes `message` on its own route, retrying transient bus failures.
    pub async fn publish<B: EventBus + ?Sized>(
        &self,
        bus: &B,
        message: &StageMessage,
    ) -> Result<Offset, PublishError> {
        let (topic, key) = message.route();
        let payload = message.encode()?;

        let offset = (|| async { bus.publish(topic, key, &payload).await })
            .retry(self.backoff())
            .when(is_transient)
            .notify(|err: &BusError, delay: Duration| {
                tracing::warn!(topic, key, error = %err, ?delay, "Publish failed, retrying");
            })
            .await?;
        Ok(offset)
    }
}

fn is_transient(err: &BusError) -> bool {
    matches!(
        err,
        BusError::Unavailable(_) | BusError::NotAcknowledged(_) | BusError::Transport(_)
    )
}

/// A publish that could not be completed.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Encode(#[from] MessageError),

    #[error(transparent)]
    Bus(#[from] BusError),
}
