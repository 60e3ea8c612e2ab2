//! HTTP gateway for the shop services.
//!
//! Exposes the buy and sell sagas plus player and inventory reads over REST,
//! with structured logging (tracing) and Prometheus metrics. In standalone
//! mode the player and inventory stage consumers and the payment response
//! router run in-process, on the same bus the orchestrator publishes to.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::{
    CatalogItem, InMemoryCatalog, InMemoryGrantStore, InMemoryLedger, InventoryService, Money,
    PlayerService,
};
use event_bus::{BusError, EventBus, InMemoryBus, InMemoryOffsetStore, OffsetStore};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    BusDeadLetterSink, DeadLetterSink, InventoryStageHandler, PaymentOrchestrator,
    PlayerStageHandler, ResponseRouter, StageConsumer,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use state::AppState;

/// Errors raised while wiring the server together.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("offset store migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("event bus unavailable: {0}")]
    Bus(#[from] BusError),

    #[error("metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/payment_v1/payment/buy", post(routes::payment::buy))
        .route("/payment_v1/payment/sell", post(routes::payment::sell))
        .route(
            "/player_v1/player/{player_id}/account",
            get(routes::player::account),
        )
        .route("/player_v1/player/add-money", post(routes::player::add_money))
        .route(
            "/inventory_v1/inventory/{player_id}",
            get(routes::inventory::list),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The items sold by the standalone server.
pub fn seeded_catalog() -> InMemoryCatalog {
    InMemoryCatalog::with_items([
        CatalogItem::new("sword", "Iron Sword", Money::from_cents(4000)),
        CatalogItem::new("shield", "Oak Shield", Money::from_cents(2500)),
        CatalogItem::new("potion", "Healing Potion", Money::from_cents(1000)),
        CatalogItem::new("bow", "Short Bow", Money::from_cents(3000)),
    ])
}

/// Handles to the consumption loops running next to the HTTP server.
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<saga::Result<()>>)>,
}

impl BackgroundTasks {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signals every loop to stop and waits for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, task) in self.tasks {
            match task.await {
                Ok(Ok(())) => tracing::info!(task = name, "background task stopped"),
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "background task failed"),
                Err(e) => tracing::error!(task = name, error = %e, "background task panicked"),
            }
        }
    }
}

/// Wires the orchestrator, stage consumers and response router onto `bus`.
///
/// Every loop keeps its cursors in `offsets`. Must be called from within a
/// Tokio runtime; the loops are spawned immediately.
pub fn build_state(
    bus: Arc<dyn EventBus>,
    offsets: Arc<dyn OffsetStore>,
    catalog: InMemoryCatalog,
    config: &Config,
) -> (Arc<AppState>, BackgroundTasks) {
    let retry = config.retry_policy();
    let dead_letters: Arc<dyn DeadLetterSink> = Arc::new(BusDeadLetterSink::new(bus.clone()));

    let players = Arc::new(PlayerService::new(InMemoryLedger::new()));
    let mut inventory = InventoryService::new(InMemoryGrantStore::new());
    if let Some(cap) = config.inventory_item_cap {
        inventory = inventory.with_default_cap(cap);
    }
    let inventory = Arc::new(inventory);

    let router = Arc::new(
        ResponseRouter::new(bus.clone(), dead_letters.clone())
            .with_retry(retry)
            .with_abandoned_retention(config.abandoned_retention()),
    );
    let orchestrator = PaymentOrchestrator::new(
        bus.clone(),
        catalog,
        router.clone(),
        dead_letters.clone(),
        config.orchestrator(),
    );

    let (shutdown, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<(&'static str, JoinHandle<saga::Result<()>>)> = Vec::new();

    let player_consumer = StageConsumer::new(
        bus.clone(),
        offsets.clone(),
        PlayerStageHandler::new(players.clone()),
        dead_letters.clone(),
    )
    .with_retry(retry);
    tasks.push(("player-consumer", player_consumer.spawn(shutdown_rx.clone())));

    let inventory_consumer = StageConsumer::new(
        bus.clone(),
        offsets.clone(),
        InventoryStageHandler::new(inventory.clone()),
        dead_letters,
    )
    .with_retry(retry);
    tasks.push((
        "inventory-consumer",
        inventory_consumer.spawn(shutdown_rx.clone()),
    ));

    let router_rx = shutdown_rx;
    tasks.push((
        "payment-router",
        tokio::spawn(async move { router.run(offsets, router_rx).await }),
    ));

    let state = Arc::new(AppState {
        orchestrator,
        players,
        inventory,
    });

    (state, BackgroundTasks { shutdown, tasks })
}

/// Creates the default application state on an in-memory bus and offset store.
pub fn create_default_state() -> (Arc<AppState>, BackgroundTasks) {
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let offsets: Arc<dyn OffsetStore> = Arc::new(InMemoryOffsetStore::new());
    build_state(bus, offsets, seeded_catalog(), &Config::default())
}
