//! SQLite-backed [`MetricStore`] implementation.
//!
//! Each transaction checks its own connection out of the pool and returns it
//! when committed, rolled back or dropped. sqlx rolls back a transaction
//! that is dropped without a commit, so an aborted request never leaves
//! partial writes behind.

use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};

use package_metrics_core::models::NewObservation;
use package_metrics_core::store::{MetricStore, MetricTransaction};
use package_metrics_core::{PackageUrl, StoreError};

/// SQLite implementation of the [`MetricStore`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MetricStore for SqliteStore {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Unavailable("connection pool is closed".to_string()));
        }
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn MetricTransaction>, StoreError> {
        let tx = self.pool.begin().await.map_err(StoreError::backend)?;
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl MetricTransaction for SqliteTransaction {
    async fn clear_metrics(
        &mut self,
        package_url: &PackageUrl,
        key: &str,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM metrics WHERE package_url = ? AND key = ?")
            .bind(package_url.to_string())
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        Ok(result.rows_affected())
    }

    async fn insert_metric(&mut self, observation: &NewObservation<'_>) -> Result<u64, StoreError> {
        let properties = observation.properties.map(|p| p.to_string());
        let result = sqlx::query(
            "INSERT INTO metrics (package_url, key, properties, value, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(observation.package_url.to_string())
        .bind(observation.key)
        .bind(properties)
        .bind(observation.value)
        .bind(observation.timestamp.timestamp_millis())
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.commit().await.map_err(StoreError::backend)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.rollback().await.map_err(StoreError::backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, schema};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_db_path(tmp.path().join("metrics.sqlite"));
        let pool = db::connect(&config).await.unwrap();
        schema::ensure_schema(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    async fn count(store: &SqliteStore, purl: &str, key: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM metrics WHERE package_url = ? AND key = ?")
            .bind(purl)
            .bind(key)
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_commit() {
        let (_tmp, store) = test_store().await;
        let purl = PackageUrl::parse("pkg:npm/foo@1.0.0").unwrap();
        let props = serde_json::json!({ "source": "registry" });
        let ts = Utc.with_ymd_and_hms(2021, 4, 3, 21, 40, 0).unwrap();

        let mut tx = store.begin().await.unwrap();
        let inserted = tx
            .insert_metric(&NewObservation {
                package_url: &purl,
                key: "downloads",
                value: "42",
                timestamp: ts,
                properties: Some(&props),
            })
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        tx.commit().await.unwrap();

        let (value, properties, timestamp): (String, Option<String>, i64) = sqlx::query_as(
            "SELECT value, properties, timestamp FROM metrics WHERE package_url = ? AND key = ?",
        )
        .bind("pkg:npm/foo@1.0.0")
        .bind("downloads")
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(value, "42");
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&properties.unwrap()).unwrap(),
            props
        );
        assert_eq!(timestamp, ts.timestamp_millis());
    }

    #[tokio::test]
    async fn test_absent_properties_stored_as_null() {
        let (_tmp, store) = test_store().await;
        let purl = PackageUrl::parse("pkg:npm/foo").unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_metric(&NewObservation {
            package_url: &purl,
            key: "stars",
            value: "1",
            timestamp: Utc::now(),
            properties: None,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let nulls: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metrics WHERE properties IS NULL")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[tokio::test]
    async fn test_clear_then_rollback_restores_rows() {
        let (_tmp, store) = test_store().await;
        let purl = PackageUrl::parse("pkg:npm/foo").unwrap();

        let mut tx = store.begin().await.unwrap();
        for i in 0..3 {
            let value = i.to_string();
            tx.insert_metric(&NewObservation {
                package_url: &purl,
                key: "downloads",
                value: &value,
                timestamp: Utc::now(),
                properties: None,
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.clear_metrics(&purl, "downloads").await.unwrap(), 3);
        tx.rollback().await.unwrap();
        assert_eq!(count(&store, "pkg:npm/foo", "downloads").await, 3);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.clear_metrics(&purl, "downloads").await.unwrap(), 3);
        tx.commit().await.unwrap();
        assert_eq!(count(&store, "pkg:npm/foo", "downloads").await, 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_discarded() {
        let (_tmp, store) = test_store().await;
        let purl = PackageUrl::parse("pkg:npm/foo").unwrap();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_metric(&NewObservation {
                package_url: &purl,
                key: "downloads",
                value: "1",
                timestamp: Utc::now(),
                properties: None,
            })
            .await
            .unwrap();
        }
        assert_eq!(count(&store, "pkg:npm/foo", "downloads").await, 0);
    }

    #[tokio::test]
    async fn test_ping_fails_after_close() {
        let (_tmp, store) = test_store().await;
        assert!(store.ping().await.is_ok());
        store.pool().close().await;
        assert!(store.ping().await.is_err());
    }
}
