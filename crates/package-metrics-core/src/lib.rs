//! # package-metrics core
//!
//! Storage-agnostic logic for package-metrics: package URL parsing, batch
//! item validation, the store traits, the ingestion orchestrator and the
//! response envelope.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. The SQLite
//! backend and the HTTP/CLI surface live in the `package-metrics` crate.

pub mod batch;
pub mod error;
pub mod models;
pub mod purl;
pub mod response;
pub mod store;
pub mod validate;

pub use batch::{ingest_batch, BatchOutcome, TransactionState};
pub use error::{ErrorKind, IngestError, StepError, StoreError};
pub use purl::{MalformedIdentifier, PackageUrl};
pub use response::{Envelope, Status};
