//! Domain layer for the shop services.
//!
//! This crate provides the state each saga stage mutates:
//! - the player ledger, an append-only set of balance changes owned by the
//!   player service
//! - inventory grants, one record per owned unit, owned by the inventory service
//! - the catalog lookup the payment service resolves prices through

pub mod catalog;
pub mod error;
pub mod inventory;
pub mod player;
pub mod value_objects;

pub use catalog::{Catalog, CatalogError, CatalogItem, InMemoryCatalog};
pub use error::DomainError;
pub use inventory::{Grant, GrantStore, InMemoryGrantStore, InventoryError, InventoryService};
pub use player::{InMemoryLedger, Ledger, LedgerEntry, PlayerError, PlayerService};
pub use value_objects::{ItemId, Money, PlayerId};
