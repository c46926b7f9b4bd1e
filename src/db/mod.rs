//! Database module for the sync cursors and the member mirror.
//!
//! This module provides SQLite-based storage for:
//! - Sync cursors (how far each event type has been mirrored)
//! - Member records (referrer and join time per address)
//!
//! # Architecture
//!
//! - `models`: Data structures that map to database tables
//! - `repository`: CRUD operations, cursor compare-and-swap, member upserts
//! - Connection pooling with SQLite WAL mode for concurrency
//! - Migration system for schema versioning

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::IndexerError;

pub mod models;
pub mod repository;

pub use repository::Repository;

/// Tables that must exist once migrations have run.
const REQUIRED_TABLES: [&str; 2] = ["sync_cursors", "members"];

/// Creates a SQLite connection pool with optimized settings and runs migrations.
///
/// # Configuration
///
/// - **WAL mode**: Enables concurrent readers during writes
/// - **Busy timeout**: 30 seconds to handle lock contention
/// - **Max connections**: 5 (suitable for a single-machine syncer)
///
/// # Example
///
/// ```no_run
/// use referral_sync::db::create_pool;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool("sqlite:./referral_sync.db").await?;
///     Ok(())
/// }
/// ```
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, IndexerError> {
    info!(database_url, "Connecting to database");

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| {
            IndexerError::database(
                format!("Failed to parse database URL: {database_url}"),
                Some(Box::new(e)),
            )
        })?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(|e| {
            IndexerError::database(
                format!("Failed to connect to database at {database_url}"),
                Some(Box::new(e)),
            )
        })?;

    info!("Running database migrations");
    run_migrations(&pool).await?;
    verify_database(&pool).await?;
    info!("Database migrations complete");

    Ok(pool)
}

/// Runs database migrations to ensure schema is up-to-date.
///
/// Migrations are applied in order and are idempotent (safe to run multiple times).
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), IndexerError> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        IndexerError::database(
            "Failed to run database migrations".to_string(),
            Some(Box::new(e)),
        )
    })?;

    Ok(())
}

/// Verify that required tables exist after migrations.
pub async fn verify_database(pool: &SqlitePool) -> Result<(), IndexerError> {
    let rows = sqlx::query_as::<_, (String,)>(
        r#"
        SELECT name FROM sqlite_master
        WHERE type='table' AND name IN ('sync_cursors', 'members')
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| {
        IndexerError::database("Failed to verify database schema".to_string(), Some(Box::new(e)))
    })?;

    if rows.len() < REQUIRED_TABLES.len() {
        return Err(IndexerError::database(
            format!(
                "Database schema incomplete. Expected {} tables, found {}",
                REQUIRED_TABLES.len(),
                rows.len()
            ),
            None,
        ));
    }

    Ok(())
}
