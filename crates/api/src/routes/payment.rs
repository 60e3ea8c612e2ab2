//! Buy and sell endpoints backed by the payment orchestrator.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::ItemId;
use saga::TransferResponse;
use serde::Deserialize;
use validator::Validate;

use crate::error::ApiError;
use crate::extract::PlayerIdentity;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentRequest {
    #[validate(nested)]
    pub items: Vec<ItemLine>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ItemLine {
    #[validate(length(min = 1, max = 64))]
    pub item_id: String,
}

impl PaymentRequest {
    /// Validated, trimmed item ids. Rejected before any saga starts.
    fn item_ids(&self) -> Result<Vec<ItemId>, ApiError> {
        self.validate()
            .map_err(|e| ApiError::BadRequest(format!("invalid item list: {e}")))?;
        self.items
            .iter()
            .map(|line| match line.item_id.trim() {
                "" => Err(ApiError::BadRequest("item_id is blank".to_string())),
                id => Ok(ItemId::new(id)),
            })
            .collect()
    }
}

/// POST /payment_v1/payment/buy
pub async fn buy(
    State(state): State<Arc<AppState>>,
    PlayerIdentity(player_id): PlayerIdentity,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<Vec<TransferResponse>>, ApiError> {
    let receipts = state
        .orchestrator
        .buy_item(&player_id, &req.item_ids()?)
        .await?;
    Ok(Json(receipts))
}

/// POST /payment_v1/payment/sell
pub async fn sell(
    State(state): State<Arc<AppState>>,
    PlayerIdentity(player_id): PlayerIdentity,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<Vec<TransferResponse>>, ApiError> {
    let receipts = state
        .orchestrator
        .sell_item(&player_id, &req.item_ids()?)
        .await?;
    Ok(Json(receipts))
}
