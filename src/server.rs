//! HTTP server: the JSON surface in front of [`Console`].
//!
//! Provides [`router`] for embedding the routes elsewhere (and in tests) and
//! [`serve`], which wires up the database, embedding provider and config and
//! listens until Ctrl-C.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::{Arc, Mutex};

use crate::config::KindredConfig;
use crate::console::{ChatRequest, Console, PreparedTurn, RecordTurnRequest, RecordedTurn};
use crate::db;
use crate::embedding;
use crate::error::ConsoleError;

/// Message shown to users who ran out of daily requests.
pub const QUOTA_MESSAGE: &str = "Daily limit reached. Upgrade to premium for unlimited chat.";

impl IntoResponse for ConsoleError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, body) = match &self {
            ConsoleError::QuotaExceeded { remaining } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": QUOTA_MESSAGE, "kind": kind, "remaining": remaining }),
            ),
            ConsoleError::AccessDenied { persona_id } => (
                StatusCode::FORBIDDEN,
                json!({ "error": self.to_string(), "kind": kind, "persona_id": persona_id }),
            ),
            ConsoleError::PersonaNotFound { persona_id } => (
                StatusCode::NOT_FOUND,
                json!({ "error": self.to_string(), "kind": kind, "persona_id": persona_id }),
            ),
            ConsoleError::MissingPersona | ConsoleError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.to_string(), "kind": kind }),
            ),
            _ => {
                tracing::error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal error", "kind": kind }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ConsoleError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ConsoleError::InvalidRequest(rejection.body_text()))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn prepare(
    State(console): State<Console>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<PreparedTurn>, ConsoleError> {
    let request = parse_body(payload)?;
    let prepared = console.prepare_turn(&request).await?;
    Ok(Json(prepared))
}

async fn record(
    State(console): State<Console>,
    payload: Result<Json<RecordTurnRequest>, JsonRejection>,
) -> Result<Json<RecordedTurn>, ConsoleError> {
    let request = parse_body(payload)?;
    let recorded = console.record_turn(&request).await?;
    Ok(Json(recorded))
}

pub fn router(console: Console) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/console/prepare", post(prepare))
        .route("/v1/console/turns", post(record))
        .with_state(console)
}

/// Shared setup: open DB, create embedding provider, check model version.
fn build_console(config: KindredConfig) -> anyhow::Result<Console> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    if let Ok(Some(stored_model)) = db::migrations::get_embedding_model(&conn) {
        if stored_model != config.embedding.model {
            tracing::warn!(
                stored = %stored_model,
                configured = %config.embedding.model,
                "embedding model changed; stored vectors will not match new queries"
            );
        }
    }

    let embedding = embedding::create_provider(&config.embedding)?;
    tracing::info!(provider = %config.embedding.provider, "embedding provider ready");

    Ok(Console::new(
        Arc::new(Mutex::new(conn)),
        embedding,
        Arc::new(config),
    ))
}

/// Start the HTTP server and block until Ctrl-C.
pub async fn serve(config: KindredConfig) -> anyhow::Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let console = build_console(config)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "kindred listening at http://{bind_addr}");

    axum::serve(listener, router(console))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
