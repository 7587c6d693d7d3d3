pub mod schema;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("invalid DATABASE_URL: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Handle over the durable store. Cheap to clone; all mutations that span
/// more than one row go through `pool().begin()` so each event is a single
/// atomic transaction.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn from_env() -> Result<Self, DbInitError> {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:learning.db?mode=rwc".to_string());
        Self::connect(&url, 10).await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DbInitError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DbInitError::InvalidUrl(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Shared in-memory database for tests. A single connection keeps
    /// every caller on the same memory instance.
    pub async fn in_memory() -> Result<Self, DbInitError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbInitError::InvalidUrl(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies the embedded schema. Idempotent: every statement is
    /// `IF NOT EXISTS`, so re-running is safe.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        for stmt in schema::split_sql_statements(schema::SCHEMA_SQL) {
            sqlx::query(&stmt).execute(&self.pool).await?;
        }

        sqlx::query(
            r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#,
        )
        .bind(SCHEMA_VERSION)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
