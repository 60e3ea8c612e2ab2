//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::{OrchestratorConfig, RetryPolicy};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables (and a `.env` file when present):
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `KAFKA_URL`: bootstrap servers; the in-memory bus is used when unset
/// - `KAFKA_API_KEY` / `KAFKA_SECRET`: SASL credentials for `KAFKA_URL`
/// - `DATABASE_URL`: Postgres offset store; in-memory cursors when unset
/// - `SAGA_STAGE_TIMEOUT_MS`: per-line response timeout (default: `3000`)
/// - `RETRY_MAX_ATTEMPTS`: publish attempts per message (default: `3`)
/// - `INVENTORY_ITEM_CAP`: units of one item a player may hold; uncapped when unset
/// - `ABANDONED_RETENTION_SECS`: how long a timed-out stage is watched for a
///   late response to compensate (default: `300`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub kafka_url: Option<String>,
    pub kafka_api_key: Option<String>,
    pub kafka_secret: Option<String>,
    pub database_url: Option<String>,
    pub stage_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub inventory_item_cap: Option<usize>,
    pub abandoned_retention_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            kafka_url: non_empty("KAFKA_URL"),
            kafka_api_key: non_empty("KAFKA_API_KEY"),
            kafka_secret: non_empty("KAFKA_SECRET"),
            database_url: non_empty("DATABASE_URL"),
            stage_timeout_ms: parsed("SAGA_STAGE_TIMEOUT_MS").unwrap_or(defaults.stage_timeout_ms),
            retry_max_attempts: parsed("RETRY_MAX_ATTEMPTS")
                .unwrap_or(defaults.retry_max_attempts),
            inventory_item_cap: parsed("INVENTORY_ITEM_CAP"),
            abandoned_retention_secs: parsed("ABANDONED_RETENTION_SECS")
                .unwrap_or(defaults.abandoned_retention_secs),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.retry_max_attempts.max(1))
    }

    pub fn abandoned_retention(&self) -> Duration {
        Duration::from_secs(self.abandoned_retention_secs)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            stage_timeout: Duration::from_millis(self.stage_timeout_ms),
            retry: self.retry_policy(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            kafka_url: None,
            kafka_api_key: None,
            kafka_secret: None,
            database_url: None,
            stage_timeout_ms: 3000,
            retry_max_attempts: 3,
            inventory_item_cap: None,
            abandoned_retention_secs: 300,
        }
    }
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
