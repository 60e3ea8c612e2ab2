//! Inventory grants: one record per owned unit of an item.

mod grants;
mod service;

pub use grants::{GrantStore, InMemoryGrantStore};
pub use service::InventoryService;

use chrono::{DateTime, Utc};
use common::{CorrelationId, RecordId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_objects::{ItemId, PlayerId};

/// Errors that can occur during inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The player owns no unit of the item.
    #[error("item not found: player {player_id} does not own {item_id}")]
    ItemNotOwned { player_id: PlayerId, item_id: ItemId },

    /// The player already owns the maximum number of units of the item.
    #[error("capacity exceeded: player {player_id} already holds {cap} of {item_id}")]
    CapacityExceeded {
        player_id: PlayerId,
        item_id: ItemId,
        cap: usize,
    },

    /// The grant request was applied once and has since been rolled back.
    #[error("grant request {0} was rolled back")]
    RolledBack(CorrelationId),

    /// The grant store backend failed.
    #[error("inventory storage error: {0}")]
    Storage(String),
}

/// Ownership of one unit of an item by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: RecordId,
    pub player_id: PlayerId,
    pub item_id: ItemId,
    /// The stage request that produced this grant, if any.
    pub correlation_id: Option<CorrelationId>,
    pub created_at: DateTime<Utc>,
}

impl Grant {
    pub fn new(player_id: PlayerId, item_id: ItemId, correlation_id: Option<CorrelationId>) -> Self {
        Self {
            id: RecordId::new(),
            player_id,
            item_id,
            correlation_id,
            created_at: Utc::now(),
        }
    }
}
