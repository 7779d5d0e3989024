//! # package-metrics
//!
//! Batch ingestion of time-series metrics about software packages.
//!
//! Clients submit batches of observations keyed by package URL (purl) and
//! metric key. Each batch runs in a single SQLite transaction: `insert`
//! appends values, `replace` clears the (package, key) series first. Bad
//! items are reported while the rest of the batch still commits; a
//! malformed package URL aborts and rolls back the whole batch.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────┐   ┌──────────┐
//! │  HTTP / CLI  │──▶│ package-metrics-core │──▶│  SQLite  │
//! │ (axum, pkgm) │   │ validate + batch     │   │ metrics  │
//! └──────────────┘   └──────────────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pkgm init                     # create database
//! pkgm ingest batch.json        # ingest one batch from a file
//! pkgm serve                    # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection pool |
//! | [`schema`] | `metrics` table bootstrap |
//! | [`sqlite_store`] | SQLite store and transaction |
//! | [`ingest`] | One-shot ingestion command |
//! | [`server`] | HTTP server |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod db;
pub mod ingest;
pub mod logging;
pub mod schema;
pub mod server;
pub mod sqlite_store;

pub use package_metrics_core as core;
