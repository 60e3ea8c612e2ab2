//! The payment service's saga orchestrator.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{CorrelationId, SagaId};
use domain::{Catalog, CatalogError, ItemId, Money, PlayerId};
use event_bus::EventBus;
use futures_util::future::join_all;
use tokio::sync::oneshot;

use crate::dead_letter::{DeadLetter, DeadLetterSink, dead_letter};
use crate::error::{Result, SagaError};
use crate::messages::{InventoryRequest, StageMessage, TransactionRequest, TransferResponse};
use crate::retry::RetryPolicy;
use crate::router::{ResponseRouter, Stage};
use crate::state::{SagaLifecycle, SagaState};
use crate::topics::PAYMENT_SERVICE;

pub const SAGA_BUY: &str = "buy";
pub const SAGA_SELL: &str = "sell";

/// Timing and retry settings for the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// How long to wait for each line's response within a stage.
    pub stage_timeout: Duration,
    /// Applied to every request and compensation publish.
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_millis(3000),
            retry: RetryPolicy::default(),
        }
    }
}

/// One priced line item.
#[derive(Debug, Clone)]
struct Line {
    item_id: ItemId,
    price: Money,
}

/// Result of one line within a stage: the successful response, or why it failed.
type LineOutcome = std::result::Result<TransferResponse, String>;

/// Drives buy and sell sagas across the player and inventory services.
///
/// Every request within a stage is published before any response is
/// awaited; the responses are then awaited concurrently, each bounded by
/// [`OrchestratorConfig::stage_timeout`]. The saga only decides to proceed
/// or compensate once every line of the stage has an outcome.
pub struct PaymentOrchestrator<B: EventBus + ?Sized, C: Catalog> {
    bus: Arc<B>,
    catalog: C,
    router: Arc<ResponseRouter<B>>,
    dead_letters: Arc<dyn DeadLetterSink>,
    config: OrchestratorConfig,
}

impl<B: EventBus + ?Sized, C: Catalog> PaymentOrchestrator<B, C> {
    pub fn new(
        bus: Arc<B>,
        catalog: C,
        router: Arc<ResponseRouter<B>>,
        dead_letters: Arc<dyn DeadLetterSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            bus,
            catalog,
            router,
            dead_letters,
            config,
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn router(&self) -> &Arc<ResponseRouter<B>> {
        &self.router
    }

    /// Buys every item in `items` for `player_id`.
    ///
    /// Debits each line's catalog price, then grants each item. Returns one
    /// receipt line per item on success. If any line fails, every committed
    /// debit and grant of this saga is compensated and
    /// [`SagaError::PurchaseFailed`] is returned.
    #[tracing::instrument(skip(self, items), fields(saga_type = SAGA_BUY, items = items.len()))]
    pub async fn buy_item(
        &self,
        player_id: &PlayerId,
        items: &[ItemId],
    ) -> Result<Vec<TransferResponse>> {
        metrics::counter!("saga_executions_total", "saga_type" => SAGA_BUY).increment(1);
        let started = Instant::now();
        let mut saga = SagaLifecycle::new(SagaId::new(), SAGA_BUY);

        let result = self.run_buy(&mut saga, player_id, items).await;
        record_outcome(SAGA_BUY, &saga, started);
        result
    }

    /// Sells every item in `items` for `player_id` at its catalog price.
    ///
    /// Revokes each item, then credits each line. If a revoke fails, the other
    /// revokes are restored. If a credit fails, every credit is rolled back
    /// and every revoked item is re-granted.
    #[tracing::instrument(skip(self, items), fields(saga_type = SAGA_SELL, items = items.len()))]
    pub async fn sell_item(
        &self,
        player_id: &PlayerId,
        items: &[ItemId],
    ) -> Result<Vec<TransferResponse>> {
        metrics::counter!("saga_executions_total", "saga_type" => SAGA_SELL).increment(1);
        let started = Instant::now();
        let mut saga = SagaLifecycle::new(SagaId::new(), SAGA_SELL);

        let result = self.run_sell(&mut saga, player_id, items).await;
        record_outcome(SAGA_SELL, &saga, started);
        result
    }

    async fn run_buy(
        &self,
        saga: &mut SagaLifecycle,
        player_id: &PlayerId,
        items: &[ItemId],
    ) -> Result<Vec<TransferResponse>> {
        let saga_id = saga.saga_id();
        let lines = match self.price(items).await {
            Ok(lines) => lines,
            Err(e) => {
                saga.advance(SagaState::Failed);
                return Err(e);
            }
        };
        saga.advance(SagaState::Running);

        let debits = self
            .run_stage(
                saga_id,
                Stage::Debit,
                lines.iter().map(|line| {
                    StageMessage::DebitMoney(transaction(saga_id, player_id, line, -line.price))
                }),
            )
            .await;
        if let Some(reasons) = failures(&lines, &debits) {
            tracing::warn!(%saga_id, failures = ?reasons, "Debit stage failed");
            saga.advance(SagaState::Compensating);
            self.compensate(Stage::Debit, &debits).await;
            saga.advance(SagaState::Failed);
            return Err(SagaError::PurchaseFailed { saga_id });
        }

        let grants = self
            .run_stage(
                saga_id,
                Stage::Grant,
                lines
                    .iter()
                    .map(|line| StageMessage::GrantItem(inventory(saga_id, player_id, line))),
            )
            .await;
        if let Some(reasons) = failures(&lines, &grants) {
            tracing::warn!(%saga_id, failures = ?reasons, "Grant stage failed");
            saga.advance(SagaState::Compensating);
            self.compensate(Stage::Grant, &grants).await;
            self.compensate(Stage::Debit, &debits).await;
            saga.advance(SagaState::Failed);
            return Err(SagaError::PurchaseFailed { saga_id });
        }

        saga.advance(SagaState::Completed);
        Ok(receipts(debits, grants))
    }

    async fn run_sell(
        &self,
        saga: &mut SagaLifecycle,
        player_id: &PlayerId,
        items: &[ItemId],
    ) -> Result<Vec<TransferResponse>> {
        let saga_id = saga.saga_id();
        let lines = match self.price(items).await {
            Ok(lines) => lines,
            Err(e) => {
                saga.advance(SagaState::Failed);
                return Err(e);
            }
        };
        saga.advance(SagaState::Running);

        let revokes = self
            .run_stage(
                saga_id,
                Stage::Revoke,
                lines
                    .iter()
                    .map(|line| StageMessage::RevokeItem(inventory(saga_id, player_id, line))),
            )
            .await;
        if let Some(reasons) = failures(&lines, &revokes) {
            tracing::warn!(%saga_id, failures = ?reasons, "Revoke stage failed");
            saga.advance(SagaState::Compensating);
            self.compensate(Stage::Revoke, &revokes).await;
            saga.advance(SagaState::Failed);
            return Err(SagaError::SaleFailed { saga_id });
        }

        let credits = self
            .run_stage(
                saga_id,
                Stage::Credit,
                lines.iter().map(|line| {
                    StageMessage::CreditMoney(transaction(saga_id, player_id, line, line.price))
                }),
            )
            .await;
        if let Some(reasons) = failures(&lines, &credits) {
            tracing::warn!(%saga_id, failures = ?reasons, "Credit stage failed");
            saga.advance(SagaState::Compensating);
            self.compensate(Stage::Credit, &credits).await;
            self.compensate(Stage::Revoke, &revokes).await;
            saga.advance(SagaState::Failed);
            return Err(SagaError::SaleFailed { saga_id });
        }

        saga.advance(SagaState::Completed);
        Ok(receipts(credits, revokes))
    }

    /// Resolves a price for every line. Fails before any stage runs.
    async fn price(&self, items: &[ItemId]) -> Result<Vec<Line>> {
        if items.is_empty() {
            return Err(SagaError::EmptyRequest);
        }
        let distinct: BTreeSet<ItemId> = items.iter().cloned().collect();
        let catalog = self.catalog.resolve_prices(&distinct).await?;

        items
            .iter()
            .map(|item_id| {
                catalog
                    .get(item_id)
                    .map(|entry| Line {
                        item_id: item_id.clone(),
                        price: entry.price,
                    })
                    .ok_or_else(|| {
                        SagaError::from(CatalogError::UnknownItems(vec![item_id.clone()]))
                    })
            })
            .collect()
    }

    /// Publishes one request per line, then awaits every response.
    ///
    /// Outcomes are returned in line order.
    async fn run_stage(
        &self,
        saga_id: SagaId,
        stage: Stage,
        requests: impl Iterator<Item = StageMessage>,
    ) -> Vec<LineOutcome> {
        let mut in_flight = Vec::new();
        for request in requests {
            let correlation_id = request.correlation_id();
            let receiver = self.router.register(correlation_id, stage).await;

            match self.config.retry.publish(self.bus.as_ref(), &request).await {
                Ok(offset) => {
                    tracing::debug!(%saga_id, %stage, %correlation_id, %offset, "Stage request published");
                    in_flight.push(Ok((correlation_id, receiver)));
                }
                Err(e) => {
                    // The request may still have landed; a late success is compensated.
                    self.router.abandon(correlation_id).await;
                    tracing::warn!(%saga_id, %stage, %correlation_id, error = %e, "Stage request not published");
                    in_flight.push(Err(format!("publish failed: {e}")));
                }
            }
        }

        join_all(in_flight.into_iter().map(|flight| async move {
            let (correlation_id, receiver) = flight?;
            self.await_response(saga_id, stage, correlation_id, receiver)
                .await
        }))
        .await
    }

    async fn await_response(
        &self,
        saga_id: SagaId,
        stage: Stage,
        correlation_id: CorrelationId,
        receiver: oneshot::Receiver<TransferResponse>,
    ) -> LineOutcome {
        match tokio::time::timeout(self.config.stage_timeout, receiver).await {
            Ok(Ok(response)) if response.is_success() => Ok(response),
            Ok(Ok(response)) => Err(response.error),
            Ok(Err(_)) => Err("response channel closed".to_string()),
            Err(_) => {
                self.router.abandon(correlation_id).await;
                tracing::warn!(%saga_id, %stage, %correlation_id, "Timed out waiting for stage response");
                Err(format!("{stage} timed out"))
            }
        }
    }

    /// Undoes every successful line of `stage`.
    ///
    /// Compensations commute, so they are published in any order. A
    /// compensation that cannot be published is dead-lettered.
    async fn compensate(&self, stage: Stage, outcomes: &[LineOutcome]) {
        for response in outcomes.iter().filter_map(|o| o.as_ref().ok()) {
            let Some(compensation) = stage.compensation(response) else {
                continue;
            };
            match self.config.retry.publish(self.bus.as_ref(), &compensation).await {
                Ok(_) => {
                    tracing::info!(
                        saga_id = %response.saga_id,
                        %stage,
                        kind = compensation.kind(),
                        "Compensation published"
                    );
                }
                Err(e) => {
                    dead_letter(
                        self.dead_letters.as_ref(),
                        DeadLetter::unpublished(PAYMENT_SERVICE, &compensation, e.to_string()),
                    )
                    .await;
                }
            }
        }
    }
}

fn transaction(saga_id: SagaId, player_id: &PlayerId, line: &Line, amount: Money) -> TransactionRequest {
    TransactionRequest {
        saga_id,
        correlation_id: CorrelationId::new(),
        player_id: player_id.to_string(),
        item_id: line.item_id.to_string(),
        amount,
    }
}

fn inventory(saga_id: SagaId, player_id: &PlayerId, line: &Line) -> InventoryRequest {
    InventoryRequest {
        saga_id,
        correlation_id: CorrelationId::new(),
        player_id: player_id.to_string(),
        item_id: line.item_id.to_string(),
    }
}

/// Per-line failure reasons, or `None` if every line succeeded.
fn failures(lines: &[Line], outcomes: &[LineOutcome]) -> Option<Vec<String>> {
    let reasons: Vec<String> = lines
        .iter()
        .zip(outcomes)
        .filter_map(|(line, outcome)| {
            outcome
                .as_ref()
                .err()
                .map(|reason| format!("{}: {reason}", line.item_id))
        })
        .collect();
    (!reasons.is_empty()).then_some(reasons)
}

/// Merges the ledger and inventory responses of each line into one receipt.
fn receipts(ledger: Vec<LineOutcome>, inventory: Vec<LineOutcome>) -> Vec<TransferResponse> {
    ledger
        .into_iter()
        .zip(inventory)
        .filter_map(|(ledger, inventory)| {
            let (ledger, inventory) = (ledger.ok()?, inventory.ok()?);
            Some(TransferResponse {
                inventory_id: inventory.inventory_id,
                ..ledger
            })
        })
        .collect()
}

fn record_outcome(saga_type: &'static str, saga: &SagaLifecycle, started: Instant) {
    metrics::histogram!("saga_duration_seconds", "saga_type" => saga_type)
        .record(started.elapsed().as_secs_f64());
    match saga.state() {
        SagaState::Completed => {
            metrics::counter!("saga_completed", "saga_type" => saga_type).increment(1);
        }
        _ => {
            metrics::counter!("saga_failed", "saga_type" => saga_type).increment(1);
        }
    }
}
