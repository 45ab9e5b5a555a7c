//! SQLite persistence: pool setup, embedded migrations, models and repositories.

pub mod models;
pub mod repositories;
pub mod retry;
pub mod time;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::Result;

pub type DbPool = Pool<Sqlite>;

/// The processor writes one item at a time and the API is light, so a
/// handful of connections covers both.
pub const DEFAULT_POOL_SIZE: u32 = 5;

/// How long a connection waits on a locked database before `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a pool on `database_url`, creating the file if needed.
///
/// Every connection runs in WAL mode with foreign keys on, so history rows
/// follow their queue item on delete.
pub async fn init_pool_with_size(database_url: &str, max_connections: u32) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true)
        .pragma("temp_store", "memory");

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(BUSY_TIMEOUT * 2)
        .connect_with(options)
        .await?;

    info!(max_connections, "Database pool ready");
    Ok(pool)
}

pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    init_pool_with_size(database_url, DEFAULT_POOL_SIZE).await
}

/// Apply the schema in `migrations/`. Already applied versions are skipped.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(sqlx::Error::from)?;
    info!("Database schema up to date");
    Ok(())
}

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connections_enforce_foreign_keys() {
        let pool = test_pool().await;

        let (enabled,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);

        let (timeout,): (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(timeout, 5_000);
    }

    #[tokio::test]
    async fn test_migrations_create_notification_tables() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'notification_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(count, 6);
    }
}
