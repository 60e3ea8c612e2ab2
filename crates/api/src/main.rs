//! API server entry point.

use std::sync::Arc;

use api::BootstrapError;
use api::config::Config;
use event_bus::{EventBus, InMemoryBus, InMemoryOffsetStore, OffsetStore, PostgresOffsetStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn offset_store(config: &Config) -> Result<Arc<dyn OffsetStore>, BootstrapError> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let store = PostgresOffsetStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("using Postgres offset store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("DATABASE_URL not set, offsets are kept in memory");
            Ok(Arc::new(InMemoryOffsetStore::new()))
        }
    }
}

#[cfg(feature = "kafka")]
fn event_bus(config: &Config) -> Result<Arc<dyn EventBus>, BootstrapError> {
    use event_bus::{KafkaBus, KafkaBusConfig};

    let Some(url) = &config.kafka_url else {
        tracing::info!("KAFKA_URL not set, using the in-memory bus");
        return Ok(Arc::new(InMemoryBus::new()));
    };

    let mut kafka = KafkaBusConfig::new(url.clone());
    if let (Some(key), Some(secret)) = (&config.kafka_api_key, &config.kafka_secret) {
        kafka = kafka.with_sasl(key.clone(), secret.clone());
    }
    Ok(Arc::new(KafkaBus::new(kafka)?))
}

#[cfg(not(feature = "kafka"))]
fn event_bus(config: &Config) -> Result<Arc<dyn EventBus>, BootstrapError> {
    if config.kafka_url.is_some() {
        tracing::warn!("KAFKA_URL is set but the kafka feature is disabled, using the in-memory bus");
    }
    Ok(Arc::new(InMemoryBus::new()))
}

#[tokio::main]
async fn main() -> Result<(), BootstrapError> {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Connect the bus and cursor store, then start the stage loops
    let bus = event_bus(&config)?;
    let offsets = offset_store(&config).await?;
    let (state, background) = api::build_state(bus, offsets, api::seeded_catalog(), &config);
    tracing::info!(tasks = background.len(), "stage consumers started");

    // 4. Build the application
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 6. Stop the consumers after the last request drains
    background.shutdown().await;
    tracing::info!("server shut down gracefully");
    Ok(())
}
