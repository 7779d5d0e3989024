//! HTTP ingestion server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/metrics` | Ingest one batch of metric observations |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Response Contract
//!
//! `POST /api/metrics` always answers with a JSON envelope:
//!
//! ```json
//! { "status": "success", "message": "Updated 4 records." }
//! { "status": "error", "message": "Missing required field (index #0)" }
//! ```
//!
//! Success is HTTP 200, error is HTTP 400. An error envelope never reports
//! the change count, even when part of the batch was committed.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use package_metrics_core::store::MetricStore;
use package_metrics_core::{ingest_batch, Envelope};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;
use crate::{db, schema};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    /// Connection provider, opened once at startup.
    store: Arc<dyn MetricStore>,
}

/// Starts the HTTP server.
///
/// Opens the database pool, makes sure the `metrics` table exists, binds to
/// `[server].bind`, and serves until SIGINT or SIGTERM.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    schema::ensure_schema(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));

    let app = router(store, config.server.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "metrics server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("server shut down gracefully");
    Ok(())
}

/// Build the application router around a store.
///
/// Exposed so tests can drive the routes without binding a socket.
pub fn router(store: Arc<dyn MetricStore>, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/metrics", post(handle_ingest))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { store })
}

/// Listen for SIGTERM and SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }
}

// ============ Envelope response ============

/// An [`Envelope`] rendered as HTTP 200 (success) or 400 (error).
struct EnvelopeResponse(Envelope);

impl IntoResponse for EnvelopeResponse {
    fn into_response(self) -> Response {
        let status = if self.0.is_success() {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        };
        (status, Json(self.0)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/metrics ============

/// Handler for `POST /api/metrics`.
///
/// The body is parsed here rather than through `Json<_>` so that malformed
/// JSON still gets an error envelope. A connection that fails its health
/// check is reported before any transaction is opened.
async fn handle_ingest(State(state): State<AppState>, body: Bytes) -> EnvelopeResponse {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return EnvelopeResponse(Envelope::error(format!("Invalid JSON payload: {}", e)));
        }
    };

    match ingest_batch(state.store.as_ref(), &payload, Utc::now()).await {
        Ok(outcome) => {
            tracing::info!(
                changes = outcome.total_changes,
                errors = outcome.errors.len(),
                state = ?outcome.state,
                "batch processed"
            );
            EnvelopeResponse(Envelope::from(&outcome))
        }
        Err(e) => {
            tracing::error!(error = %e, cause = ?e, "no usable database connection");
            EnvelopeResponse(Envelope::from(&e))
        }
    }
}
