//! Schema bootstrap for the `metrics` table.
//!
//! Statements are idempotent, so `pkgm init` and server startup can both run
//! them against an existing database.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the database file and the `metrics` table if they don't exist.
pub async fn init_database(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    ensure_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Idempotently create the `metrics` table and its partition index.
///
/// `timestamp` is stored as unix milliseconds (UTC). `properties` holds JSON
/// text or NULL.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_url TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            properties TEXT,
            timestamp INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_metrics_package_url_key ON metrics(package_url, key)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
