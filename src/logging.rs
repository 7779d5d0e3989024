//! Tracing subscriber setup for the `pkgm` binary.
//!
//! Log lines go to stderr so that `pkgm ingest` can print the response
//! envelope on stdout. `RUST_LOG` takes precedence over `[log].level`.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Install the global `fmt` subscriber.
///
/// Calling this twice is harmless: the second subscriber is dropped.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level: '{}'", config.level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("global subscriber already installed");
    }

    Ok(())
}
