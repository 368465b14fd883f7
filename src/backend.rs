//! Search engine abstraction.
//!
//! The [`SearchEngine`] trait defines the capability surface the adapter
//! needs from any engine: document upsert, per-job delete, full clear,
//! commit, ranked search, and a reachability ping. Concrete variants are
//! selected from configuration by [`create_engine`], never by inheritance.
//!
//! Implementations must be `Send + Sync`; every operation is async and may
//! perform network I/O. Upserts are keyed by [`IndexDocument::id`] — adding
//! a document twice replaces it, it never duplicates.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`ping`](SearchEngine::ping) | Cheap reachability probe |
//! | [`add_documents`](SearchEngine::add_documents) | Upsert a batch of documents |
//! | [`delete_job`](SearchEngine::delete_job) | Drop all documents of one job |
//! | [`delete_all`](SearchEngine::delete_all) | Clear the index (rebuild prologue) |
//! | [`commit`](SearchEngine::commit) | Make prior mutations visible to search |
//! | [`search`](SearchEngine::search) | Ranked page of matching documents |
//! | [`document_count`](SearchEngine::document_count) | Total indexed documents |

use async_trait::async_trait;
use std::sync::Arc;

use crate::backend_memory::InMemoryEngine;
use crate::backend_solr::SolrEngine;
use crate::config::{BackendConfig, RetryConfig};
use crate::error::{BackendError, Result};
use crate::models::{IndexDocument, SearchHit};

/// Capability surface of a search engine.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Engine variant name (`"solr"`, `"memory"`), for logs and `/health`.
    fn name(&self) -> &str;

    /// Probe reachability. Used by `configure` and reconnect attempts.
    async fn ping(&self) -> Result<()>;

    /// Upsert documents by id. Visible to search after [`commit`](SearchEngine::commit).
    async fn add_documents(&self, docs: &[IndexDocument]) -> Result<()>;

    /// Delete every document belonging to `job`. No-op if none exist.
    async fn delete_job(&self, job: &str) -> Result<()>;

    /// Delete every document in the index.
    async fn delete_all(&self) -> Result<()>;

    /// Make all prior mutations visible to search.
    async fn commit(&self) -> Result<()>;

    /// One page of matching documents, ranked by relevance (score desc,
    /// ties broken by id asc for determinism).
    async fn search(&self, query: &str, start: usize, rows: usize) -> Result<Vec<SearchHit>>;

    /// Total number of indexed documents.
    async fn document_count(&self) -> Result<usize>;
}

/// Instantiate the engine variant named by the configuration.
///
/// # Errors
///
/// Returns [`BackendError::Configuration`] when the backend is disabled or
/// the kind is unknown. Reachability is not checked here — that is the
/// adapter's `configure` step.
pub fn create_engine(
    backend: &BackendConfig,
    retry: &RetryConfig,
) -> Result<Arc<dyn SearchEngine>> {
    if !backend.enabled {
        return Err(BackendError::Configuration(
            "backend is disabled in configuration".to_string(),
        ));
    }
    match backend.kind.as_str() {
        "solr" => Ok(Arc::new(SolrEngine::new(backend, retry)?)),
        "memory" => Ok(Arc::new(InMemoryEngine::new())),
        other => Err(BackendError::Configuration(format!(
            "unknown backend kind: '{}'",
            other
        ))),
    }
}
