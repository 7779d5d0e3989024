//! Storage abstraction for package-metrics.
//!
//! The orchestrator only needs a connection provider that can be
//! health-checked and can open a transaction, plus a transaction that can
//! clear a partition, insert one observation, and commit or roll back. The
//! [`MetricStore`] and [`MetricTransaction`] traits capture exactly that, so
//! the SQLite backend and the in-memory test backend are interchangeable.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::NewObservation;
use crate::purl::PackageUrl;

/// A connection provider for the metrics table.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ping`](MetricStore::ping) | Per-request health check |
/// | [`begin`](MetricStore::begin) | Open a transaction owning its own connection |
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Verify the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Open a new transaction.
    async fn begin(&self) -> Result<Box<dyn MetricTransaction>, StoreError>;
}

/// An open transaction against the metrics table.
///
/// Dropping a transaction without calling [`commit`](MetricTransaction::commit)
/// must discard its changes.
#[async_trait]
pub trait MetricTransaction: Send {
    /// Delete every observation for `(package_url, key)`. Returns the number
    /// of rows deleted.
    async fn clear_metrics(&mut self, package_url: &PackageUrl, key: &str)
        -> Result<u64, StoreError>;

    /// Insert one observation. Returns the number of rows inserted.
    async fn insert_metric(&mut self, observation: &NewObservation<'_>) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
