//! HTTP server.
//!
//! Exposes the query contract and chunk inspection as a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Answer a question (`{"query": "...", "top_k": 10}`) |
//! | `GET`  | `/api/chunk/{id}` | Chunk detail in any lifecycle state |
//! | `GET`  | `/api/relationships/{id}` | Outgoing relationship edges |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `answer_generation_failed` (502), `store_error` (500).
//!
//! A generation failure also carries the evidence that was gathered:
//!
//! ```json
//! { "error": { "code": "answer_generation_failed", "message": "..." },
//!   "retrieved_chunks": [ ... ] }
//! ```
//!
//! Refusals are ordinary `200` responses with `"refused": true`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use lexguard_core::evidence::ChunkView;
use lexguard_core::models::Relationship;
use lexguard_core::retrieval::{QueryRequest, QueryResponse, Retriever};
use lexguard_core::store::ChunkRepository;

use crate::config::Config;
use crate::get::{get_chunk_detail, ChunkDetail};
use crate::query::open_retriever;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    retriever: Arc<Retriever>,
    repo: Arc<dyn ChunkRepository>,
}

impl AppState {
    pub fn new(retriever: Retriever, repo: Arc<dyn ChunkRepository>) -> Self {
        Self {
            retriever: Arc::new(retriever),
            repo,
        }
    }
}

/// Routes and middleware over `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/chunk/{id}", get(handle_chunk))
        .route("/api/relationships/{id}", get(handle_relationships))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Open the database and providers named in `config` and build the app.
pub async fn build_app(config: &Config) -> anyhow::Result<Router> {
    let (store, retriever) = open_retriever(config).await?;
    Ok(router(AppState::new(retriever, store)))
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let app = build_app(config).await?;
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("lexguard listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    retrieved_chunks: Option<Vec<ChunkView>>,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    retrieved_chunks: Option<Vec<ChunkView>>,
}

impl AppError {
    fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            retrieved_chunks: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
            retrieved_chunks: self.retrieved_chunks,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

fn store_error(err: impl std::fmt::Display) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string())
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

// ============ POST /api/query ============

/// Answers and refusals are `200`. A model failure is `502` with the
/// evidence attached.
async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if req.top_k == Some(0) {
        return Err(bad_request("top_k must be at least 1"));
    }

    let response = state.retriever.answer(&req).await.map_err(|e| {
        warn!(error = %e, "query failed");
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, e.code(), e.to_string())
    })?;

    match response {
        QueryResponse::GenerationFailed(failure) => Err(AppError {
            status: StatusCode::BAD_GATEWAY,
            code: failure.code,
            message: failure.message,
            retrieved_chunks: Some(failure.retrieved_chunks),
        }),
        other => Ok(Json(other)),
    }
}

// ============ GET /api/chunk/{id} ============

async fn handle_chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChunkDetail>, AppError> {
    get_chunk_detail(state.repo.as_ref(), &id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("chunk not found: {}", id)))
}

// ============ GET /api/relationships/{id} ============

#[derive(Serialize)]
struct RelationshipsResponse {
    chunk_id: String,
    relationships: Vec<Relationship>,
}

async fn handle_relationships(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RelationshipsResponse>, AppError> {
    if state.repo.get_chunk(&id).await.map_err(store_error)?.is_none() {
        return Err(not_found(format!("chunk not found: {}", id)));
    }
    let relationships = state.repo.relationships(&id).await.map_err(store_error)?;
    Ok(Json(RelationshipsResponse {
        chunk_id: id,
        relationships,
    }))
}
