//! Disposable in-process search engine for integration tests.
//!
//! Speaks just enough of the Solr wire shape for the HTTP engine: the JSON
//! update API (add array, delete-by-query, commit), the select API, and the
//! admin ping. Bound to an OS-allocated free port so parallel tests never
//! collide. A failure counter lets tests inject transient 503s to exercise
//! the retry path.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use build_search::backend::SearchEngine;
use build_search::backend_memory::InMemoryEngine;
use build_search::models::IndexDocument;

#[derive(Clone)]
struct FakeState {
    engine: Arc<InMemoryEngine>,
    /// Respond 503 this many times before behaving again.
    failures: Arc<AtomicU32>,
}

/// Handle to a running fake engine.
pub struct FakeSolr {
    pub addr: SocketAddr,
    pub failures: Arc<AtomicU32>,
    engine: Arc<InMemoryEngine>,
}

impl FakeSolr {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Make the next `n` requests fail with 503.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub async fn document_count(&self) -> usize {
        self.engine.document_count().await.unwrap()
    }
}

fn take_failure(failures: &AtomicU32) -> bool {
    failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

async fn ping(State(state): State<FakeState>) -> Response {
    if take_failure(&state.failures) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({ "status": "OK" })).into_response()
}

async fn update(State(state): State<FakeState>, Json(body): Json<Value>) -> Response {
    if take_failure(&state.failures) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    if let Some(docs) = body.as_array() {
        let mut parsed = Vec::with_capacity(docs.len());
        for raw in docs {
            match serde_json::from_value::<IndexDocument>(raw.clone()) {
                Ok(doc) => parsed.push(doc),
                Err(e) => {
                    return (StatusCode::BAD_REQUEST, format!("bad document: {}", e))
                        .into_response()
                }
            }
        }
        state.engine.add_documents(&parsed).await.unwrap();
    } else if let Some(query) = body.pointer("/delete/query").and_then(|q| q.as_str()) {
        if query == "*:*" {
            state.engine.delete_all().await.unwrap();
        } else if let Some(job) = query
            .strip_prefix("job:\"")
            .and_then(|rest| rest.strip_suffix('"'))
        {
            let job = job.replace("\\\"", "\"").replace("\\\\", "\\");
            state.engine.delete_job(&job).await.unwrap();
        } else {
            return (StatusCode::BAD_REQUEST, "unsupported delete query").into_response();
        }
    }
    // Commit bodies are `{}`; mutations become visible either way, which is
    // what commit=true requests expect.
    state.engine.commit().await.unwrap();
    Json(json!({ "responseHeader": { "status": 0 } })).into_response()
}

async fn select(
    State(state): State<FakeState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if take_failure(&state.failures) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let q = params.get("q").map(String::as_str).unwrap_or("");
    let start: usize = params.get("start").and_then(|s| s.parse().ok()).unwrap_or(0);
    let rows: usize = params.get("rows").and_then(|s| s.parse().ok()).unwrap_or(10);

    if q == "*:*" {
        let count = state.engine.document_count().await.unwrap();
        return Json(json!({ "response": { "numFound": count, "docs": [] } })).into_response();
    }

    match state.engine.search(q, start, rows).await {
        Ok(hits) => {
            let num_found = state.engine.search(q, 0, usize::MAX >> 1).await.unwrap().len();
            let docs: Vec<Value> = hits
                .into_iter()
                .map(|hit| {
                    let mut doc = serde_json::to_value(&hit.doc).unwrap();
                    doc["score"] = json!(hit.score);
                    doc
                })
                .collect();
            Json(json!({ "response": { "numFound": num_found, "docs": docs } })).into_response()
        }
        // The engine rejects malformed queries the way Solr does: HTTP 400.
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

/// Bind to a free local port and serve the fake engine until dropped.
pub async fn spawn_fake_solr(core: &str) -> FakeSolr {
    let engine = Arc::new(InMemoryEngine::new());
    let failures = Arc::new(AtomicU32::new(0));
    let state = FakeState {
        engine: Arc::clone(&engine),
        failures: Arc::clone(&failures),
    };

    let app = Router::new()
        .route(&format!("/solr/{}/admin/ping", core), get(ping))
        .route(&format!("/solr/{}/update", core), post(update))
        .route(&format!("/solr/{}/select", core), get(select))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeSolr {
        addr,
        failures,
        engine,
    }
}
