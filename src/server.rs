//! Operational HTTP surface.
//!
//! Exposes the engine's core operations via a JSON HTTP API. Every endpoint
//! maps 1:1 onto an engine operation:
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `GET`  | `/health` | liveness check (version) |
//! | `GET`  | `/status` | local tracking state summary |
//! | `GET`  | `/stats` | vector index statistics |
//! | `GET`  | `/search?q=…&top_k=…` | query/answer composition |
//! | `POST` | `/sync` | run one sync cycle |
//! | `POST` | `/cleanup` | remove orphaned tracked files |
//!
//! # Error Contract
//!
//! All error responses use the shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `sync_in_progress` (409),
//! `upstream_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::EngineError;
use crate::models::{IndexStats, QueryAnswer, StatusReport, SyncReport};
use crate::sync::SyncEngine;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<SyncEngine>,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and serves until the
/// process is terminated.
pub async fn run_server(engine: Arc<SyncEngine>) -> anyhow::Result<()> {
    let bind_addr = engine.config().server.bind.clone();
    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/stats", get(handle_stats))
        .route("/search", get(handle_search))
        .route("/sync", post(handle_sync))
        .route("/cleanup", post(handle_cleanup))
        .layer(cors)
        .with_state(state);

    println!("docsync server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Map an engine error to the most appropriate HTTP status code.
impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let (status, code) = match &err {
            EngineError::InvalidInput(_)
            | EngineError::UnsupportedFormat(_)
            | EngineError::Extraction(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            EngineError::SyncInProgress => (StatusCode::CONFLICT, "sync_in_progress"),
            EngineError::Provider(_) | EngineError::Store(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            EngineError::CorruptState(_) | EngineError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ Handlers ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.engine.status().await)
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<IndexStats>, AppError> {
    Ok(Json(state.engine.stats().await?))
}

/// Query parameters for `GET /search`.
#[derive(Deserialize)]
struct SearchParams {
    q: String,
    top_k: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<QueryAnswer>, AppError> {
    let answer = state.engine.ask(&params.q, params.top_k).await?;
    Ok(Json(answer))
}

async fn handle_sync(State(state): State<AppState>) -> Result<Json<SyncReport>, AppError> {
    Ok(Json(state.engine.run_sync().await?))
}

/// JSON response body for `POST /cleanup`.
#[derive(Serialize)]
struct CleanupResponse {
    removed_count: usize,
}

async fn handle_cleanup(State(state): State<AppState>) -> Result<Json<CleanupResponse>, AppError> {
    let removed_count = state.engine.cleanup().await?;
    Ok(Json(CleanupResponse { removed_count }))
}
