use std::sync::Arc;

use async_trait::async_trait;
use domain::{DomainError, Ledger, PlayerService};

use super::{StageHandler, unroutable};
use crate::error::Result;
use crate::messages::{StageMessage, TransactionRequest, TransferResponse};
use crate::topics::{PLAYER_SERVICE, PLAYER_TOPIC};

/// Debit, credit and rollback-transaction on the `player` topic.
pub struct PlayerStageHandler<L: Ledger> {
    players: Arc<PlayerService<L>>,
}

impl<L: Ledger> PlayerStageHandler<L> {
    pub fn new(players: Arc<PlayerService<L>>) -> Self {
        Self { players }
    }

    async fn debit(&self, request: TransactionRequest) -> TransferResponse {
        let response = request.response();
        match self
            .players
            .debit(&request.player(), request.amount, Some(request.correlation_id))
            .await
        {
            Ok(entry) => response.with_transaction(entry.id),
            Err(e) => {
                tracing::info!(saga_id = %request.saga_id, player_id = %request.player_id, error = %e, "Debit rejected");
                response.with_error(e.to_string())
            }
        }
    }

    async fn credit(&self, request: TransactionRequest) -> TransferResponse {
        let response = request.response();
        match self
            .players
            .credit(&request.player(), request.amount, Some(request.correlation_id))
            .await
        {
            Ok(entry) => response.with_transaction(entry.id),
            Err(e) => {
                tracing::info!(saga_id = %request.saga_id, player_id = %request.player_id, error = %e, "Credit rejected");
                response.with_error(e.to_string())
            }
        }
    }
}

#[async_trait]
impl<L: Ledger> StageHandler for PlayerStageHandler<L> {
    fn service(&self) -> &'static str {
        PLAYER_SERVICE
    }

    fn topic(&self) -> &'static str {
        PLAYER_TOPIC
    }

    #[tracing::instrument(skip_all, fields(kind = message.kind(), saga_id = %message.saga_id()))]
    async fn handle(&self, message: StageMessage) -> Result<Option<StageMessage>> {
        match message {
            StageMessage::DebitMoney(request) => {
                Ok(Some(StageMessage::BuyResponse(self.debit(request).await)))
            }
            StageMessage::CreditMoney(request) => {
                Ok(Some(StageMessage::SellResponse(self.credit(request).await)))
            }
            StageMessage::RollbackTransaction(request) => {
                self.players
                    .rollback_transaction(request.transaction_id)
                    .await
                    .map_err(DomainError::from)?;
                Ok(None)
            }
            other @ (StageMessage::GrantItem(_)
            | StageMessage::RevokeItem(_)
            | StageMessage::RollbackGrantItem(_)
            | StageMessage::RollbackRevokeItem(_)
            | StageMessage::BuyResponse(_)
            | StageMessage::SellResponse(_)) => Err(unroutable(PLAYER_SERVICE, &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CorrelationId, SagaId};
    use domain::{InMemoryLedger, Money, PlayerId};

    use crate::error::SagaError;
    use crate::messages::{InventoryRequest, RollbackTransactionRequest};

    async fn handler_with_balance(cents: i64) -> PlayerStageHandler<InMemoryLedger> {
        let players = Arc::new(PlayerService::new(InMemoryLedger::new()));
        players
            .credit(&PlayerId::new("player-1"), Money::from_cents(cents), None)
            .await
            .unwrap();
        PlayerStageHandler::new(players)
    }

    fn request(amount: i64) -> TransactionRequest {
        TransactionRequest {
            saga_id: SagaId::new(),
            correlation_id: CorrelationId::new(),
            player_id: "player-1".into(),
            item_id: "sword".into(),
            amount: Money::from_cents(amount),
        }
    }

    fn expect_response(message: Option<StageMessage>) -> TransferResponse {
        match message {
            Some(StageMessage::BuyResponse(r)) | Some(StageMessage::SellResponse(r)) => r,
            other => panic!("expected a response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn debit_answers_with_ledger_id() {
        let handler = handler_with_balance(1000).await;
        let request = request(-400);

        let response = expect_response(
            handler
                .handle(StageMessage::DebitMoney(request.clone()))
                .await
                .unwrap(),
        );

        assert!(response.is_success());
        assert!(response.transaction_id.is_some());
        assert_eq!(response.correlation_id, request.correlation_id);
        assert_eq!(
            handler.players.balance(&PlayerId::new("player-1")).await.unwrap(),
            Money::from_cents(600)
        );
    }

    #[tokio::test]
    async fn insufficient_funds_is_carried_as_data() {
        let handler = handler_with_balance(100).await;

        let response = expect_response(
            handler
                .handle(StageMessage::DebitMoney(request(-400)))
                .await
                .unwrap(),
        );

        assert!(response.error.contains("insufficient funds"));
        assert!(response.transaction_id.is_none());
    }

    #[tokio::test]
    async fn credit_answers_on_sell_route() {
        let handler = handler_with_balance(0).await;
        let message = handler
            .handle(StageMessage::CreditMoney(request(400)))
            .await
            .unwrap();

        assert!(matches!(message, Some(StageMessage::SellResponse(_))));
    }

    #[tokio::test]
    async fn rollback_produces_no_response() {
        let handler = handler_with_balance(1000).await;
        let response = expect_response(
            handler
                .handle(StageMessage::DebitMoney(request(-400)))
                .await
                .unwrap(),
        );

        let rollback = StageMessage::RollbackTransaction(RollbackTransactionRequest {
            saga_id: response.saga_id,
            correlation_id: CorrelationId::new(),
            transaction_id: response.transaction_id.unwrap(),
        });
        assert!(handler.handle(rollback.clone()).await.unwrap().is_none());
        // Replaying the rollback is a no-op.
        assert!(handler.handle(rollback).await.unwrap().is_none());

        assert_eq!(
            handler.players.balance(&PlayerId::new("player-1")).await.unwrap(),
            Money::from_cents(1000)
        );
    }

    #[tokio::test]
    async fn replayed_debit_after_rollback_answers_with_error() {
        let handler = handler_with_balance(1000).await;
        let debit = StageMessage::DebitMoney(request(-400));
        let response = expect_response(handler.handle(debit.clone()).await.unwrap());

        let rollback = StageMessage::RollbackTransaction(RollbackTransactionRequest {
            saga_id: response.saga_id,
            correlation_id: CorrelationId::new(),
            transaction_id: response.transaction_id.unwrap(),
        });
        handler.handle(rollback).await.unwrap();

        let replayed = expect_response(handler.handle(debit).await.unwrap());
        assert!(replayed.error.contains("rolled back"));
        assert!(replayed.transaction_id.is_none());
        assert_eq!(
            handler.players.balance(&PlayerId::new("player-1")).await.unwrap(),
            Money::from_cents(1000)
        );
    }

    #[tokio::test]
    async fn inventory_kinds_are_unroutable() {
        let handler = handler_with_balance(0).await;
        let message = StageMessage::GrantItem(InventoryRequest {
            saga_id: SagaId::new(),
            correlation_id: CorrelationId::new(),
            player_id: "player-1".into(),
            item_id: "sword".into(),
        });

        let err = handler.handle(message).await.unwrap_err();
        assert!(matches!(
            err,
            SagaError::Unroutable {
                service: "player",
                topic: "inventory",
                key: "buy"
            }
        ));
    }
}
