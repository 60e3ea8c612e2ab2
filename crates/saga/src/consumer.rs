//! The consumption loop that drives one service's stage handler.

use std::sync::Arc;

use event_bus::{BusMessage, EventBus, OffsetCursor, OffsetStore, open_consumer_or_rewind};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dead_letter::{DeadLetter, DeadLetterSink, dead_letter};
use crate::error::Result;
use crate::handlers::StageHandler;
use crate::messages::StageMessage;
use crate::retry::RetryPolicy;

/// Consumes one (service, topic) pair and applies every message through its
/// [`StageHandler`].
///
/// For each message, in offset order: decode, apply, publish the response
/// (with retry), then commit the cursor to `offset + 1`. Messages that cannot
/// be decoded or applied, and responses that cannot be published, are
/// dead-lettered; the cursor still advances past them.
///
/// The loop owns its [`OffsetCursor`] exclusively.
pub struct StageConsumer<B, S, H>
where
    B: EventBus + ?Sized,
    S: OffsetStore,
    H: StageHandler,
{
    bus: Arc<B>,
    store: S,
    handler: H,
    dead_letters: Arc<dyn DeadLetterSink>,
    retry: RetryPolicy,
}

impl<B, S, H> StageConsumer<B, S, H>
where
    B: EventBus + ?Sized + 'static,
    S: OffsetStore + 'static,
    H: StageHandler + 'static,
{
    pub fn new(bus: Arc<B>, store: S, handler: H, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        Self {
            bus,
            store,
            handler,
            dead_letters,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs the loop on a new task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(shutdown))
    }

    /// Consumes until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let service = self.handler.service();
        let topic = self.handler.topic();

        let mut cursor = OffsetCursor::load(self.store, service, topic).await?;
        let start = cursor.start_offset();
        let mut stream = open_consumer_or_rewind(self.bus.as_ref(), topic, start).await?;
        tracing::info!(service, topic, %start, "Stage consumer started");

        if *shutdown.borrow_and_update() {
            return Ok(());
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = stream.next() => match next {
                    Some(Ok(message)) => {
                        process(
                            self.bus.as_ref(),
                            &self.handler,
                            self.dead_letters.as_ref(),
                            &self.retry,
                            &mut cursor,
                            message,
                        )
                        .await;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(service, topic, error = %e, "Transport error while consuming");
                    }
                    None => {
                        tracing::warn!(service, topic, "Message stream ended");
                        break;
                    }
                },
            }
        }

        tracing::info!(service, topic, position = ?cursor.position(), "Stage consumer stopped");
        Ok(())
    }
}

async fn process<B, S, H>(
    bus: &B,
    handler: &H,
    dead_letters: &dyn DeadLetterSink,
    retry: &RetryPolicy,
    cursor: &mut OffsetCursor<S>,
    message: BusMessage,
) where
    B: EventBus + ?Sized,
    S: OffsetStore,
    H: StageHandler,
{
    let service = handler.service();
    rewind_cursor_if_needed(cursor, &message).await;

    let outcome = match StageMessage::decode(&message.topic, &message.key, &message.payload) {
        Err(e) => {
            dead_letter(dead_letters, DeadLetter::consumed(service, &message, e.to_string())).await;
            "poison"
        }
        Ok(decoded) => match handler.handle(decoded).await {
            Ok(Some(response)) => match retry.publish(bus, &response).await {
                Ok(_) => "applied",
                Err(e) => {
                    dead_letter(
                        dead_letters,
                        DeadLetter::unpublished(service, &response, e.to_string()),
                    )
                    .await;
                    "unanswered"
                }
            },
            Ok(None) => "applied",
            Err(e) => {
                dead_letter(dead_letters, DeadLetter::consumed(service, &message, e.to_string()))
                    .await;
                "rejected"
            }
        },
    };

    if let Err(e) = cursor.commit(message.offset).await {
        // The message is replayed after a restart; handlers are idempotent.
        tracing::error!(service, topic = %message.topic, offset = %message.offset, error = %e, "Cursor commit failed");
    }

    metrics::counter!(
        "stage_messages_processed_total",
        "service" => service,
        "key" => message.key.clone(),
        "outcome" => outcome
    )
    .increment(1);
    tracing::debug!(service, key = %message.key, offset = %message.offset, outcome, "Stage message processed");
}

/// After a rewind to offset 0 the stored cursor lies ahead of the stream.
async fn rewind_cursor_if_needed<S: OffsetStore>(cursor: &mut OffsetCursor<S>, message: &BusMessage) {
    if let Some(position) = cursor.position()
        && message.offset < position
    {
        tracing::warn!(
            service = cursor.service(),
            topic = cursor.topic(),
            %position,
            offset = %message.offset,
            "Stream rewound behind cursor, resetting"
        );
        if let Err(e) = cursor.reset(message.offset).await {
            tracing::error!(error = %e, "Cursor reset failed");
        }
    }
}
