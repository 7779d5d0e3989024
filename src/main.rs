//! # package-metrics CLI (`pkgm`)
//!
//! ## Usage
//!
//! ```bash
//! pkgm --config ./config/pkgm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pkgm init` | Create the SQLite database and the `metrics` table |
//! | `pkgm ingest <FILE>` | Ingest one batch from a JSON file (`-` for stdin) |
//! | `pkgm serve` | Start the HTTP ingestion server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use package_metrics::{config, ingest, logging, schema, server};

/// package-metrics CLI: batch ingestion of package metrics into SQLite.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pkgm.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pkgm",
    about = "Batch ingestion of time-series metrics about software packages",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pkgm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `metrics` table. Safe to run
    /// more than once.
    Init,

    /// Ingest one batch of metrics.
    ///
    /// The file holds the same JSON array accepted by `POST /api/metrics`.
    /// The response envelope is printed to stdout. Exits non-zero if the
    /// envelope is an error.
    Ingest {
        /// Path to the batch file, or `-` to read stdin.
        file: PathBuf,
    },

    /// Start the HTTP ingestion server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.log)?;

    match cli.command {
        Commands::Init => {
            schema::init_database(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file } => {
            ingest::run_ingest(&cfg, &file).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
