//! In-memory [`MetricStore`] implementation for testing.
//!
//! Rows live in a `Vec` behind `std::sync::RwLock`. A transaction works on a
//! private copy of the table and publishes it on commit, so rollback and
//! drop simply discard the copy. Concurrent writers are last-commit-wins;
//! this backend is meant for single-request tests.
//!
//! [`Faults`] lets tests make individual operations fail.

use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{NewObservation, Observation};
use crate::purl::PackageUrl;

use super::{MetricStore, MetricTransaction};

/// Operations an [`InMemoryStore`] should fail.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// `ping` and `begin` fail.
    pub unavailable: bool,
    /// `insert_metric` fails for these metric keys.
    pub insert_keys: HashSet<String>,
    /// `clear_metrics` fails.
    pub clear: bool,
    /// `commit` fails without publishing changes.
    pub commit: bool,
}

#[derive(Default)]
struct Shared {
    rows: RwLock<Vec<Observation>>,
    faults: Mutex<Faults>,
}

impl Shared {
    fn faults(&self) -> Faults {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// In-memory store for tests.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active fault set.
    pub fn set_faults(&self, faults: Faults) {
        *self
            .shared
            .faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = faults;
    }

    /// Store rows directly, outside any transaction.
    pub fn seed(&self, rows: impl IntoIterator<Item = Observation>) {
        self.shared
            .rows
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(rows);
    }

    /// Snapshot of all committed rows, in insertion order.
    pub fn observations(&self) -> Vec<Observation> {
        self.shared
            .rows
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of committed rows for `(package_url, key)`.
    pub fn count(&self, package_url: &str, key: &str) -> usize {
        self.observations()
            .iter()
            .filter(|o| o.package_url == package_url && o.key == key)
            .count()
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::backend(io::Error::new(
        io::ErrorKind::Other,
        format!("injected {} failure", what),
    ))
}

#[async_trait]
impl MetricStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.shared.faults().unavailable {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn MetricTransaction>, StoreError> {
        self.ping().await?;
        let rows = self.observations();
        Ok(Box::new(InMemoryTransaction {
            shared: self.shared.clone(),
            rows,
        }))
    }
}

struct InMemoryTransaction {
    shared: Arc<Shared>,
    rows: Vec<Observation>,
}

#[async_trait]
impl MetricTransaction for InMemoryTransaction {
    async fn clear_metrics(
        &mut self,
        package_url: &PackageUrl,
        key: &str,
    ) -> Result<u64, StoreError> {
        if self.shared.faults().clear {
            return Err(injected("clear"));
        }
        let purl = package_url.to_string();
        let before = self.rows.len();
        self.rows.retain(|o| !(o.package_url == purl && o.key == key));
        Ok((before - self.rows.len()) as u64)
    }

    async fn insert_metric(&mut self, observation: &NewObservation<'_>) -> Result<u64, StoreError> {
        if self.shared.faults().insert_keys.contains(observation.key) {
            return Err(injected("insert"));
        }
        self.rows.push(Observation::from(observation));
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        if this.shared.faults().commit {
            return Err(injected("commit"));
        }
        *this
            .shared
            .rows
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = this.rows;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
