//! One-shot batch ingestion from a file or stdin.
//!
//! Runs a payload through the same orchestrator as `POST /api/metrics` and
//! prints the resulting envelope as JSON on stdout.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::io::Read;
use std::path::Path;

use package_metrics_core::{ingest_batch, Envelope};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;
use crate::{db, schema};

/// Ingest the batch in `file` (`-` reads stdin).
///
/// Returns an error after printing the envelope if the batch was not a
/// clean success, so the process exits non-zero.
pub async fn run_ingest(config: &Config, file: &Path) -> Result<()> {
    let raw = read_payload(file)?;

    let envelope = match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(payload) => {
            let pool = db::connect(config).await?;
            schema::ensure_schema(&pool).await?;
            let store = SqliteStore::new(pool.clone());

            let envelope = match ingest_batch(&store, &payload, Utc::now()).await {
                Ok(outcome) => Envelope::from(&outcome),
                Err(e) => Envelope::from(&e),
            };
            pool.close().await;
            envelope
        }
        Err(e) => Envelope::error(format!("Invalid JSON payload: {}", e)),
    };

    println!("{}", serde_json::to_string(&envelope)?);

    if !envelope.is_success() {
        bail!("Ingestion failed: {}", envelope.message);
    }
    Ok(())
}

fn read_payload(file: &Path) -> Result<String> {
    if file.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read payload from stdin")?;
        return Ok(raw);
    }

    std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read payload file: {}", file.display()))
}
