//! Inventory listing endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::RecordId;
use domain::PlayerId;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub player_id: String,
    pub items: Vec<InventoryItem>,
}

#[derive(Debug, Serialize)]
pub struct InventoryItem {
    pub inventory_id: RecordId,
    pub item_id: String,
    pub created_at: DateTime<Utc>,
}

/// GET /inventory_v1/inventory/{player_id}: every unit the player owns.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let player_id = PlayerId::new(player_id);
    let grants = state.inventory.items_for(&player_id).await?;

    let items = grants
        .into_iter()
        .map(|grant| InventoryItem {
            inventory_id: grant.id,
            item_id: grant.item_id.to_string(),
            created_at: grant.created_at,
        })
        .collect();

    Ok(Json(InventoryResponse {
        player_id: player_id.to_string(),
        items,
    }))
}
