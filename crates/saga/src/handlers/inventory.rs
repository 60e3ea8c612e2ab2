use std::sync::Arc;

use async_trait::async_trait;
use domain::{DomainError, GrantStore, InventoryService};

use super::{StageHandler, unroutable};
use crate::error::Result;
use crate::messages::{InventoryRequest, StageMessage, TransferResponse};
use crate::topics::{INVENTORY_SERVICE, INVENTORY_TOPIC};

/// Grant, revoke and their rollbacks on the `inventory` topic.
pub struct InventoryStageHandler<G: GrantStore> {
    inventory: Arc<InventoryService<G>>,
}

impl<G: GrantStore> InventoryStageHandler<G> {
    pub fn new(inventory: Arc<InventoryService<G>>) -> Self {
        Self { inventory }
    }

    async fn grant(&self, request: InventoryRequest) -> TransferResponse {
        let response = request.response();
        match self
            .inventory
            .grant(&request.player(), &request.item(), Some(request.correlation_id))
            .await
        {
            Ok(grant) => response.with_inventory(grant.id),
            Err(e) => {
                tracing::info!(saga_id = %request.saga_id, item_id = %request.item_id, error = %e, "Grant rejected");
                response.with_error(e.to_string())
            }
        }
    }

    async fn revoke(&self, request: InventoryRequest) -> TransferResponse {
        let response = request.response();
        match self
            .inventory
            .revoke(&request.player(), &request.item(), Some(request.correlation_id))
            .await
        {
            Ok(grant) => response.with_inventory(grant.id),
            Err(e) => {
                tracing::info!(saga_id = %request.saga_id, item_id = %request.item_id, error = %e, "Revoke rejected");
                response.with_error(e.to_string())
            }
        }
    }
}

#[async_trait]
impl<G: GrantStore> StageHandler for InventoryStageHandler<G> {
    fn service(&self) -> &'static str {
        INVENTORY_SERVICE
    }

    fn topic(&self) -> &'static str {
        INVENTORY_TOPIC
    }

    #[tracing::instrument(skip_all, fields(kind = message.kind(), saga_id = %message.saga_id()))]
    async fn handle(&self, message: StageMessage) -> Result<Option<StageMessage>> {
        match message {
            StageMessage::GrantItem(request) => {
                Ok(Some(StageMessage::BuyResponse(self.grant(request).await)))
            }
            StageMessage::RevokeItem(request) => {
                Ok(Some(StageMessage::SellResponse(self.revoke(request).await)))
            }
            StageMessage::RollbackGrantItem(request) => {
                self.inventory
                    .rollback_grant(request.inventory_id)
                    .await
                    .map_err(DomainError::from)?;
                Ok(None)
            }
            StageMessage::RollbackRevokeItem(request) => {
                self.inventory
                    .restore_grant(request.inventory_id, &request.player(), &request.item())
                    .await
                    .map_err(DomainError::from)?;
                Ok(None)
            }
            other @ (StageMessage::DebitMoney(_)
            | StageMessage::CreditMoney(_)
            | StageMessage::RollbackTransaction(_)
            | StageMessage::BuyResponse(_)
            | StageMessage::SellResponse(_)) => Err(unroutable(INVENTORY_SERVICE, &other)),
        }
    }
}
