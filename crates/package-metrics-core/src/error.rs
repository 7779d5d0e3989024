//! Error types for batch ingestion.
//!
//! Failures inside a batch are reported as [`StepError`]s. Each carries an
//! [`ErrorKind`] that tells the orchestrator whether to keep going
//! ([`ErrorKind::ItemLocal`], [`ErrorKind::ValueLocal`]) or to abort and roll
//! back the whole batch ([`ErrorKind::BatchFatal`]).

use std::fmt;

use thiserror::Error;

/// Scope of a failure within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A batch item is missing a field or names an unknown operation.
    /// The item is skipped, later items still run.
    ItemLocal,
    /// A single value failed to insert. Sibling values and later items still run.
    ValueLocal,
    /// The batch cannot continue. Everything done so far is rolled back.
    BatchFatal,
}

/// A failure recorded while processing one batch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepError {
    pub kind: ErrorKind,
    /// Position of the originating item, if the failure is tied to one.
    pub index: Option<usize>,
    message: String,
}

impl StepError {
    /// Item-local validation failure, e.g. `"Missing required field"`.
    pub fn item(index: usize, reason: &str) -> Self {
        Self {
            kind: ErrorKind::ItemLocal,
            index: Some(index),
            message: format!("{} (index #{})", reason, index),
        }
    }

    /// Value-local insertion failure for metric `key`.
    pub fn value(index: usize, key: &str, cause: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::ValueLocal,
            index: Some(index),
            message: format!("Error inserting into {} (index #{}): {}", key, index, cause),
        }
    }

    /// Batch-fatal failure. Processing stops and the transaction is rolled back.
    pub fn fatal(index: Option<usize>, cause: impl fmt::Display) -> Self {
        let message = match index {
            Some(i) => format!("Error processing payload, rolling back (index #{}): {}", i, cause),
            None => format!("Error processing payload, rolling back: {}", cause),
        };
        Self {
            kind: ErrorKind::BatchFatal,
            index,
            message,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::BatchFatal
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StepError {}

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No usable connection to the backend.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A statement or transaction primitive failed.
    #[error("{0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

/// Request-level failures that happen before a transaction exists.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Database connection unavailable.")]
    ConnectionUnavailable(#[source] StoreError),
}
