//! Operational HTTP API.
//!
//! Exposes the adapter over JSON HTTP for operators and the CI server's
//! event delivery. Thin by design: every handler delegates to the same
//! [`EventBridge`]/[`SearchAdapter`] calls the CLI uses.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Adapter state, engine name, version |
//! | `GET`  | `/search?q=…&limit=…` | Ranked search results |
//! | `POST` | `/builds` | Index one completed build record |
//! | `DELETE` | `/jobs/{job}` | Remove all documents of a job |
//! | `POST` | `/rebuild` | Clean rebuild from the configured history |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "query_syntax", "message": "unterminated quote" } }
//! ```
//!
//! Codes: `query_syntax` (400), `rebuild_aborted` (409), `engine_protocol`
//! (502), `backend_unavailable` (503), `closed` (503), `not_configured`
//! (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based
//! dashboards can call the API directly.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::BackendError;
use crate::events::EventBridge;
use crate::models::BuildRecord;

#[derive(Clone)]
struct AppState {
    bridge: Arc<EventBridge>,
}

/// Map a backend error onto the HTTP error contract.
fn error_response(err: BackendError) -> Response {
    let (status, code) = match &err {
        BackendError::QuerySyntax(_) => (StatusCode::BAD_REQUEST, "query_syntax"),
        BackendError::RebuildAborted(_) => (StatusCode::CONFLICT, "rebuild_aborted"),
        BackendError::Protocol(_) => (StatusCode::BAD_GATEWAY, "engine_protocol"),
        BackendError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable"),
        BackendError::Closed => (StatusCode::SERVICE_UNAVAILABLE, "closed"),
        BackendError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "not_configured"),
    };
    let body = json!({ "error": { "code": code, "message": err.to_string() } });
    (status, Json(body)).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    let adapter = state.bridge.adapter();
    let body = json!({
        "state": adapter.state(),
        "pending_builds": state.bridge.pending_len(),
        "version": env!("CARGO_PKG_VERSION"),
    });
    Json(body).into_response()
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
}

async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    let limit = params.limit.unwrap_or(25).min(500);
    let mut results = match state.bridge.adapter().search(&params.q) {
        Ok(results) => results,
        Err(e) => return error_response(e),
    };
    match results.take(limit).await {
        Ok(hits) => Json(json!({ "results": hits })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn index_build(State(state): State<AppState>, Json(record): Json<BuildRecord>) -> Response {
    let id = record.doc_id();
    match state.bridge.on_build_completed(record).await {
        Ok(()) => Json(json!({
            "accepted": id,
            "pending_builds": state.bridge.pending_len(),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn remove_job(State(state): State<AppState>, Path(job): Path<String>) -> Response {
    match state.bridge.on_job_deleted(&job).await {
        Ok(()) => Json(json!({ "removed": job })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn rebuild(State(state): State<AppState>) -> Response {
    match state.bridge.on_rebuild_requested().await {
        Ok(written) => Json(json!({ "written": written })).into_response(),
        Err(e) => match e.downcast::<BackendError>() {
            Ok(backend_err) => error_response(backend_err),
            Err(other) => {
                let body = json!({ "error": { "code": "internal", "message": other.to_string() } });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        },
    }
}

/// Build the router; split out so tests can drive it without a socket.
pub fn app(bridge: Arc<EventBridge>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/search", get(search))
        .route("/builds", post(index_build))
        .route("/jobs/{job}", delete(remove_job))
        .route("/rebuild", post(rebuild))
        .layer(cors)
        .with_state(AppState { bridge })
}

/// Serve the API on `bind` until the process terminates.
pub async fn run_server(bridge: Arc<EventBridge>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = bind, "http api listening");
    axum::serve(listener, app(bridge)).await?;
    Ok(())
}
