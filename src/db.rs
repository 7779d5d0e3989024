//! SQLite database connection management.
//!
//! The pool is the connection provider for the whole process: it is opened
//! once at startup and every ingestion request checks a connection out of it
//! for the lifetime of its transaction. The database file and its parent
//! directories are created automatically if they don't exist.
//!
//! # Write-Ahead Logging (WAL)
//!
//! WAL mode lets health checks and reads proceed while a batch transaction
//! holds the write lock. SQLite admits one writer at a time; concurrent
//! batches wait for the lock up to `db.busy_timeout_secs`.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// Create a connection pool to the configured SQLite database.
///
/// # Errors
///
/// Returns an error if the database cannot be created or connected to.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(config.db.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect_with(options)
        .await?;

    tracing::debug!(path = %db_path.display(), "opened database pool");

    Ok(pool)
}
