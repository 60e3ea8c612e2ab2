//! Shared application state.

use std::sync::Arc;

use domain::{InMemoryCatalog, InMemoryGrantStore, InMemoryLedger, InventoryService, PlayerService};
use event_bus::EventBus;
use saga::PaymentOrchestrator;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: PaymentOrchestrator<dyn EventBus, InMemoryCatalog>,
    pub players: Arc<PlayerService<InMemoryLedger>>,
    pub inventory: Arc<InventoryService<InMemoryGrantStore>>,
}
