use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::redis_store::RedisStore;
use crate::sample::Sample;
use crate::sink::{ReadRequest, RemoteStorage, SeriesSink, WriteError};

/// Shared application state available to every handler.
pub struct AppState {
    pub sink: SeriesSink<RedisStore>,
}

/// Builds the Axum `Router` for the ingest surface.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Write path ──────────────────────────────────────────
        .route("/write", post(write_samples))
        // ── Declared but unimplemented storage surface ──────────
        .route("/read", post(read_samples))
        .route("/healthz", get(healthz))
        // ── Diagnostics ─────────────────────────────────────────
        .route("/stats", get(retry_stats))
        .with_state(state)
}

// ─── POST /write ─────────────────────────────────────────────────

async fn write_samples(
    State(state): State<Arc<AppState>>,
    Json(samples): Json<Vec<Sample>>,
) -> Result<Response, AppError> {
    let summary = state.sink.write(&samples).await?;
    Ok(Json(summary).into_response())
}

// ─── POST /read ──────────────────────────────────────────────────

async fn read_samples(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReadRequest>,
) -> Response {
    Json(state.sink.read(&request).await).into_response()
}

// ─── GET /healthz ────────────────────────────────────────────────

async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    match state.sink.health_check().await {
        Ok(()) => Json(serde_json::json!({
            "status":  "ok",
            "backend": state.sink.name(),
        }))
        .into_response(),
        Err(e) => AppError::Backend(e.to_string()).into_response(),
    }
}

// ─── GET /stats ──────────────────────────────────────────────────

async fn retry_stats(State(state): State<Arc<AppState>>) -> Response {
    Json(state.sink.retry_stats()).into_response()
}

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    /// At least one batch submission hard-failed; every cause is kept.
    Write(WriteError),
    Backend(String),
}

impl From<WriteError> for AppError {
    fn from(e: WriteError) -> Self {
        Self::Write(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Write(e) => (
                StatusCode::BAD_GATEWAY,
                serde_json::json!({
                    "error":    e.to_string(),
                    "batches":  e.batches,
                    "failures": e.failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
                }),
            ),
            Self::Backend(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": msg }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
