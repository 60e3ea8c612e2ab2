//! Domain error types.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::inventory::InventoryError;
use crate::player::PlayerError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the player ledger.
    #[error("Player error: {0}")]
    Player(#[from] PlayerError),

    /// An error occurred in the inventory.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// The catalog could not resolve the requested items.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
