use async_trait::async_trait;
use sqlx::PgPool;

use crate::{Offset, OffsetStore, Result};

/// PostgreSQL-backed offset store.
///
/// Rows live in `consumer_offsets`, keyed by `(service, topic)`.
#[derive(Clone)]
pub struct PostgresOffsetStore {
    pool: PgPool,
}

impl PostgresOffsetStore {
    /// Creates a new PostgreSQL offset store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

#[async_trait]
impl OffsetStore for PostgresOffsetStore {
    async fn get_offset(&self, service: &str, topic: &str) -> Result<Option<Offset>> {
        let offset: Option<i64> = sqlx::query_scalar(
            r#"SELECT "offset" FROM consumer_offsets WHERE service = $1 AND topic = $2"#,
        )
        .bind(service)
        .bind(topic)
        .fetch_optional(&self.pool)
        .await?;

        Ok(offset.map(Offset::new))
    }

    async fn set_offset(&self, service: &str, topic: &str, offset: Offset) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consumer_offsets (service, topic, "offset", updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (service, topic) DO UPDATE SET
                "offset" = EXCLUDED."offset",
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(service)
        .bind(topic)
        .bind(offset.as_i64())
        .execute(&self.pool)
        .await?;

        tracing::debug!(service, topic, %offset, "offset upserted");
        Ok(())
    }
}
