//! Player account endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::RecordId;
use domain::{Money, PlayerId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::PlayerIdentity;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub player_id: String,
    /// Balance in cents.
    pub balance: Money,
}

#[derive(Debug, Deserialize)]
pub struct AddMoneyRequest {
    /// Amount in cents.
    pub amount: Money,
}

#[derive(Debug, Serialize)]
pub struct AddMoneyResponse {
    pub transaction_id: RecordId,
    pub player_id: String,
    pub amount: Money,
    pub balance: Money,
}

/// GET /player_v1/player/{player_id}/account
pub async fn account(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let player_id = PlayerId::new(player_id);
    let balance = state.players.balance(&player_id).await?;
    Ok(Json(AccountResponse {
        player_id: player_id.to_string(),
        balance,
    }))
}

/// POST /player_v1/player/add-money
pub async fn add_money(
    State(state): State<Arc<AppState>>,
    PlayerIdentity(player_id): PlayerIdentity,
    Json(req): Json<AddMoneyRequest>,
) -> Result<(StatusCode, Json<AddMoneyResponse>), ApiError> {
    if req.amount.is_negative() {
        return Err(ApiError::BadRequest(format!(
            "amount must be positive, got {}",
            req.amount
        )));
    }

    let entry = state.players.credit(&player_id, req.amount, None).await?;
    let balance = state.players.balance(&player_id).await?;
    metrics::counter!("player_top_ups_total").increment(1);
    tracing::info!(%player_id, amount = %entry.amount, %balance, "Player topped up");

    Ok((
        StatusCode::CREATED,
        Json(AddMoneyResponse {
            transaction_id: entry.id,
            player_id: player_id.to_string(),
            amount: entry.amount,
            balance,
        }),
    ))
}
