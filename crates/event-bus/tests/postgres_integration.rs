//! PostgreSQL integration tests for the offset store.
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p event-bus --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use event_bus::{Offset, OffsetCursor, OffsetStore, PostgresOffsetStore};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_consumer_offsets_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and a cleared table
async fn get_test_store() -> PostgresOffsetStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE consumer_offsets")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOffsetStore::new(pool)
}

#[tokio::test]
async fn missing_offset_returns_none() {
    let store = get_test_store().await;
    let offset = store.get_offset("player", "player").await.unwrap();
    assert_eq!(offset, None);
}

#[tokio::test]
async fn set_then_get_offset() {
    let store = get_test_store().await;
    store
        .set_offset("inventory", "inventory", Offset::new(12))
        .await
        .unwrap();

    let offset = store.get_offset("inventory", "inventory").await.unwrap();
    assert_eq!(offset, Some(Offset::new(12)));
}

#[tokio::test]
async fn set_offset_overwrites_in_place() {
    let store = get_test_store().await;
    store.set_offset("payment", "payment", Offset::new(3)).await.unwrap();
    store.set_offset("payment", "payment", Offset::new(8)).await.unwrap();

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM consumer_offsets")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);
    assert_eq!(
        store.get_offset("payment", "payment").await.unwrap(),
        Some(Offset::new(8))
    );
}

#[tokio::test]
async fn zero_offset_is_stored_distinctly_from_missing() {
    let store = get_test_store().await;
    store
        .set_offset("player", "player", Offset::first())
        .await
        .unwrap();

    assert_eq!(
        store.get_offset("player", "player").await.unwrap(),
        Some(Offset::first())
    );
    assert_eq!(store.get_offset("player", "inventory").await.unwrap(), None);
}

#[tokio::test]
async fn cursor_survives_restart() {
    let store = get_test_store().await;
    let mut cursor = OffsetCursor::load(store.clone(), "player", "player")
        .await
        .unwrap();
    for offset in [0, 1, 2] {
        cursor.commit(Offset::new(offset)).await.unwrap();
    }

    let restarted = OffsetCursor::load(store, "player", "player").await.unwrap();
    assert_eq!(restarted.start_offset(), Offset::new(3));
}
