//! Delivers stage responses on the `payment` topic to the sagas waiting on them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::CorrelationId;
use event_bus::{BusMessage, EventBus, OffsetCursor, OffsetStore, open_consumer_or_rewind};
use futures_util::StreamExt;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::time::Instant;

use crate::dead_letter::{DeadLetter, DeadLetterSink, dead_letter};
use crate::error::Result;
use crate::messages::{
    RollbackInventoryRequest, RollbackTransactionRequest, StageMessage, TransferResponse,
};
use crate::retry::RetryPolicy;
use crate::topics::{PAYMENT_SERVICE, PAYMENT_TOPIC};

/// Forward stage a correlation id was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Debit,
    Credit,
    Grant,
    Revoke,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Debit => "debit",
            Stage::Credit => "credit",
            Stage::Grant => "grant",
            Stage::Revoke => "revoke",
        }
    }

    /// The message that undoes a successful response for this stage.
    ///
    /// `None` if the response carries no record id to undo.
    pub fn compensation(&self, response: &TransferResponse) -> Option<StageMessage> {
        match self {
            Stage::Debit | Stage::Credit => response.transaction_id.map(|transaction_id| {
                StageMessage::RollbackTransaction(RollbackTransactionRequest {
                    saga_id: response.saga_id,
                    correlation_id: CorrelationId::new(),
                    transaction_id,
                })
            }),
            Stage::Grant | Stage::Revoke => response.inventory_id.map(|inventory_id| {
                let request = RollbackInventoryRequest {
                    saga_id: response.saga_id,
                    correlation_id: CorrelationId::new(),
                    inventory_id,
                    player_id: response.player_id.clone(),
                    item_id: response.item_id.clone(),
                };
                if *self == Stage::Grant {
                    StageMessage::RollbackGrantItem(request)
                } else {
                    StageMessage::RollbackRevokeItem(request)
                }
            }),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct Waiter {
    stage: Stage,
    sender: oneshot::Sender<TransferResponse>,
}

/// How long an abandoned id is remembered for late-response compensation.
pub const DEFAULT_ABANDONED_RETENTION: Duration = Duration::from_secs(300);
/// Most abandoned ids remembered at once.
pub const DEFAULT_ABANDONED_LIMIT: usize = 10_000;

struct Abandoned {
    stage: Stage,
    expires_at: Instant,
}

#[derive(Default)]
struct Waiters {
    pending: HashMap<CorrelationId, Waiter>,
    abandoned: HashMap<CorrelationId, Abandoned>,
}

impl Waiters {
    fn evict_expired(&mut self, now: Instant) {
        let before = self.abandoned.len();
        self.abandoned.retain(|_, entry| entry.expires_at > now);
        let evicted = before - self.abandoned.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Expired abandoned correlation ids");
        }
    }

    /// Remembers an abandoned id, dropping the oldest entry when at `limit`.
    fn remember(&mut self, correlation_id: CorrelationId, entry: Abandoned, limit: usize) {
        if limit == 0 {
            return;
        }
        while self.abandoned.len() >= limit {
            let oldest = self
                .abandoned
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    self.abandoned.remove(&id);
                    tracing::warn!(correlation_id = %id, "Abandoned id evicted at capacity");
                }
                None => break,
            }
        }
        self.abandoned.insert(correlation_id, entry);
    }
}

/// Demultiplexes responses by correlation id.
///
/// A saga registers each correlation id before publishing its request and
/// awaits the returned receiver. If the saga gives up waiting, it abandons
/// the id; a successful response that arrives afterwards is compensated here,
/// since no saga is left to do it.
///
/// Abandoned ids are kept for a bounded retention window and up to a fixed
/// count. Expired entries are evicted on every `register`, `abandon` and
/// `deliver`; a response arriving after eviction is dropped uncompensated.
pub struct ResponseRouter<B: EventBus + ?Sized> {
    bus: Arc<B>,
    waiters: Mutex<Waiters>,
    dead_letters: Arc<dyn DeadLetterSink>,
    retry: RetryPolicy,
    abandoned_retention: Duration,
    abandoned_limit: usize,
}

impl<B: EventBus + ?Sized> ResponseRouter<B> {
    pub fn new(bus: Arc<B>, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        Self {
            bus,
            waiters: Mutex::new(Waiters::default()),
            dead_letters,
            retry: RetryPolicy::default(),
            abandoned_retention: DEFAULT_ABANDONED_RETENTION,
            abandoned_limit: DEFAULT_ABANDONED_LIMIT,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_abandoned_retention(mut self, retention: Duration) -> Self {
        self.abandoned_retention = retention;
        self
    }

    pub fn with_abandoned_limit(mut self, limit: usize) -> Self {
        self.abandoned_limit = limit;
        self
    }

    /// Registers interest in the response to `correlation_id`.
    pub async fn register(
        &self,
        correlation_id: CorrelationId,
        stage: Stage,
    ) -> oneshot::Receiver<TransferResponse> {
        let (sender, receiver) = oneshot::channel();
        let mut waiters = self.waiters.lock().await;
        waiters.evict_expired(Instant::now());
        waiters
            .pending
            .insert(correlation_id, Waiter { stage, sender });
        receiver
    }

    /// Gives up on `correlation_id`. A late successful response is compensated.
    pub async fn abandon(&self, correlation_id: CorrelationId) {
        let now = Instant::now();
        let mut waiters = self.waiters.lock().await;
        waiters.evict_expired(now);
        if let Some(waiter) = waiters.pending.remove(&correlation_id) {
            let entry = Abandoned {
                stage: waiter.stage,
                expires_at: now + self.abandoned_retention,
            };
            waiters.remember(correlation_id, entry, self.abandoned_limit);
        }
    }

    /// Number of registered ids still waiting for a response.
    pub async fn pending_count(&self) -> usize {
        self.waiters.lock().await.pending.len()
    }

    /// Number of abandoned ids still remembered, expired ones excluded.
    pub async fn abandoned_count(&self) -> usize {
        let mut waiters = self.waiters.lock().await;
        waiters.evict_expired(Instant::now());
        waiters.abandoned.len()
    }

    /// Routes one response to its waiter.
    pub async fn deliver(&self, response: TransferResponse) {
        let correlation_id = response.correlation_id;
        let orphan = {
            let mut waiters = self.waiters.lock().await;
            waiters.evict_expired(Instant::now());
            if let Some(waiter) = waiters.pending.remove(&correlation_id) {
                match waiter.sender.send(response) {
                    Ok(()) => return,
                    // The saga stopped waiting before it could abandon the id.
                    Err(response) => Some((waiter.stage, response)),
                }
            } else {
                waiters
                    .abandoned
                    .remove(&correlation_id)
                    .map(|entry| (entry.stage, response))
            }
        };

        match orphan {
            Some((stage, response)) => self.compensate_late(stage, response).await,
            None => {
                tracing::debug!(%correlation_id, "Unmatched response dropped");
            }
        }
    }

    async fn compensate_late(&self, stage: Stage, response: TransferResponse) {
        if !response.is_success() {
            tracing::debug!(correlation_id = %response.correlation_id, %stage, "Late failed response needs no compensation");
            return;
        }
        let Some(compensation) = stage.compensation(&response) else {
            tracing::warn!(correlation_id = %response.correlation_id, %stage, "Late response carries no record id");
            return;
        };

        tracing::warn!(
            saga_id = %response.saga_id,
            correlation_id = %response.correlation_id,
            %stage,
            kind = compensation.kind(),
            "Compensating late response of abandoned stage"
        );
        if let Err(e) = self.retry.publish(self.bus.as_ref(), &compensation).await {
            dead_letter(
                self.dead_letters.as_ref(),
                DeadLetter::unpublished(PAYMENT_SERVICE, &compensation, e.to_string()),
            )
            .await;
        }
    }

    /// Consumes the `payment` topic until `shutdown` flips to `true`.
    pub async fn run<S: OffsetStore>(
        &self,
        store: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut cursor = OffsetCursor::load(store, PAYMENT_SERVICE, PAYMENT_TOPIC).await?;
        let start = cursor.start_offset();
        let mut stream = open_consumer_or_rewind(self.bus.as_ref(), PAYMENT_TOPIC, start).await?;
        tracing::info!(%start, "Response router started");

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
                        if let Some(position) = cursor.position()
                            && message.offset < position
                        {
                            cursor.reset(message.offset).await?;
                        }
                        self.route(&message).await;
                        if let Err(e) = cursor.commit(message.offset).await {
                            tracing::error!(offset = %message.offset, error = %e, "Cursor commit failed");
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Transport error while routing responses");
                    }
                    None => {
                        tracing::warn!("Response stream ended");
                        break;
                    }
                },
            }
        }

        tracing::info!(position = ?cursor.position(), "Response router stopped");
        Ok(())
    }

    async fn route(&self, message: &BusMessage) {
        match StageMessage::decode(&message.topic, &message.key, &message.payload) {
            Ok(StageMessage::BuyResponse(response) | StageMessage::SellResponse(response)) => {
                self.deliver(response).await;
            }
            Ok(other) => {
                dead_letter(
                    self.dead_letters.as_ref(),
                    DeadLetter::consumed(
                        PAYMENT_SERVICE,
                        message,
                        format!("{} is not a response", other.kind()),
                    ),
                )
                .await;
            }
            Err(e) => {
                dead_letter(
                    self.dead_letters.as_ref(),
                    DeadLetter::consumed(PAYMENT_SERVICE, message, e.to_string()),
                )
                .await;
            }
        }
    }
}
