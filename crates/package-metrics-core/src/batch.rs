//! Batch ingestion orchestration.
//!
//! Drives one batch through a single transaction:
//!
//! ```text
//! ping → begin → for each item: validate → (replace: clear) → insert values
//!      → commit (no fatal error) | rollback (fatal error)
//! ```
//!
//! Item-local and value-local failures are recorded in the [`BatchOutcome`]
//! and processing continues. A batch-fatal failure stops iteration and rolls
//! the whole transaction back. When no fatal failure occurred the transaction
//! is committed even if errors were recorded, so a batch can partially
//! succeed. A failed commit is logged and otherwise ignored.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{ErrorKind, IngestError, StepError};
use crate::models::{BatchItem, NewObservation, Operation};
use crate::store::{MetricStore, MetricTransaction};
use crate::validate::validate_item;

/// Terminal state of the batch transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// The transaction is still open. Only observable mid-run.
    #[default]
    Open,
    Committed,
    /// Commit was attempted and failed. The failure is not reported to the
    /// caller.
    CommitFailed,
    /// A batch-fatal error aborted processing.
    RolledBack,
}

/// Accumulated result of one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Errors in the order they were produced, which is batch order.
    pub errors: Vec<StepError>,
    /// Rows affected: deletes from replace operations plus inserted values.
    pub total_changes: u64,
    pub state: TransactionState,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// All error messages joined with `;`.
    pub fn error_message(&self) -> String {
        self.errors
            .iter()
            .map(StepError::message)
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Ingest a raw batch payload.
///
/// `ingested_at` is used for every value entry that has no usable timestamp.
///
/// # Errors
///
/// Returns [`IngestError::ConnectionUnavailable`] if the store fails its
/// health check or cannot open a transaction. Every failure after that point
/// is reported through the returned [`BatchOutcome`].
pub async fn ingest_batch(
    store: &dyn MetricStore,
    payload: &Value,
    ingested_at: DateTime<Utc>,
) -> Result<BatchOutcome, IngestError> {
    store
        .ping()
        .await
        .map_err(IngestError::ConnectionUnavailable)?;
    let mut tx = store
        .begin()
        .await
        .map_err(IngestError::ConnectionUnavailable)?;

    let mut outcome = BatchOutcome::default();

    match process_items(tx.as_mut(), payload, ingested_at, &mut outcome).await {
        Ok(()) => {
            tracing::info!(
                changes = outcome.total_changes,
                errors = outcome.errors.len(),
                "Committing transaction."
            );
            outcome.state = match tx.commit().await {
                Ok(()) => TransactionState::Committed,
                Err(e) => {
                    tracing::warn!(error = %e, "commit failed; ignoring");
                    TransactionState::CommitFailed
                }
            };
        }
        Err(fatal) => {
            tracing::error!(error = %fatal, "aborting batch");
            outcome.errors.push(fatal);
            if let Err(e) = tx.rollback().await {
                tracing::warn!(error = %e, "rollback failed");
            }
            outcome.state = TransactionState::RolledBack;
        }
    }

    Ok(outcome)
}

/// Run every item through the open transaction. Returns `Err` only for a
/// batch-fatal failure.
async fn process_items(
    tx: &mut dyn MetricTransaction,
    payload: &Value,
    ingested_at: DateTime<Utc>,
    outcome: &mut BatchOutcome,
) -> Result<(), StepError> {
    let items = payload
        .as_array()
        .ok_or_else(|| StepError::fatal(None, "payload must be a JSON array"))?;

    for (index, raw) in items.iter().enumerate() {
        let item = match validate_item(index, raw) {
            Ok(item) => item,
            Err(e) => match e.kind {
                ErrorKind::BatchFatal => return Err(e),
                ErrorKind::ItemLocal | ErrorKind::ValueLocal => {
                    tracing::debug!(index, error = %e, "skipping batch item");
                    outcome.errors.push(e);
                    continue;
                }
            },
        };
        apply_item(tx, index, &item, ingested_at, outcome).await?;
    }

    Ok(())
}

async fn apply_item(
    tx: &mut dyn MetricTransaction,
    index: usize,
    item: &BatchItem,
    ingested_at: DateTime<Utc>,
    outcome: &mut BatchOutcome,
) -> Result<(), StepError> {
    tracing::debug!(
        index,
        operation = item.operation.as_str(),
        package_url = %item.package_url,
        key = %item.key,
        values = item.values.len(),
        "applying batch item"
    );

    if item.operation == Operation::Replace {
        let deleted = tx
            .clear_metrics(&item.package_url, &item.key)
            .await
            .map_err(|e| StepError::fatal(Some(index), e))?;
        tracing::debug!(index, deleted, key = %item.key, "cleared partition");
        outcome.total_changes += deleted;
    }

    for entry in &item.values {
        let observation = NewObservation {
            package_url: &item.package_url,
            key: &item.key,
            value: &entry.value,
            timestamp: entry.timestamp.unwrap_or(ingested_at),
            properties: entry.properties.as_ref(),
        };
        match tx.insert_metric(&observation).await {
            Ok(inserted) => outcome.total_changes += inserted,
            Err(e) => outcome.errors.push(StepError::value(index, &item.key, e)),
        }
    }

    Ok(())
}
