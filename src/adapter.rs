//! The search backend adapter.
//!
//! [`SearchAdapter`] translates build/job lifecycle events into index
//! mutations against a pluggable [`SearchEngine`](crate::backend::SearchEngine)
//! and serves queries. It owns the connection lifecycle and enforces the
//! concurrency contract:
//!
//! - Mutations for the same job are serialized through a per-job async
//!   mutex; there is no cross-job ordering.
//! - No shared lock is held across an engine call; the lock-map guard is
//!   released before any await.
//! - A clean rebuild is cancellable: a newer rebuild, a reconfigure, or
//!   `close` bumps an epoch that each batch checks, aborting with
//!   [`BackendError::RebuildAborted`]. Batched commits keep the index
//!   consistent at every abort point.
//! - Builds indexed live while a rebuild is running are captured and
//!   re-applied after the rebuild's clear, so a build completing mid-rebuild
//!   is indexed exactly once (upserts are keyed by document id).
//!
//! # Connection states
//!
//! ```text
//! Unconfigured → Connecting → Ready ⇄ Degraded
//!                                 ↘      ↙
//!                                  Closed
//! ```
//!
//! In `Degraded`, indexing fails fast with `Unavailable` instead of
//! blocking; [`try_reconnect`](SearchAdapter::try_reconnect) probes the
//! engine and restores `Ready`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::backend::{create_engine, SearchEngine};
use crate::config::{BackendConfig, RebuildConfig, RetryConfig};
use crate::error::{BackendError, Result};
use crate::models::{BuildRecord, IndexDocument};
use crate::query::{self, SearchResults, DEFAULT_PAGE_SIZE};

/// Lifecycle state of the adapter's engine connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Unconfigured,
    Connecting,
    Ready,
    Degraded,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Unconfigured => "unconfigured",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Event-to-index translation layer over a pluggable search engine.
pub struct SearchAdapter {
    engine: RwLock<Option<Arc<dyn SearchEngine>>>,
    state: Mutex<ConnectionState>,
    /// One async mutex per job name; guards per-job mutation ordering.
    job_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Bumped by every rebuild, reconfigure, and close; an in-flight
    /// rebuild aborts when its epoch is no longer current.
    rebuild_epoch: AtomicU64,
    /// Set while a rebuild runs; live index writes are captured for replay.
    rebuilding: AtomicBool,
    live_overlap: Mutex<Vec<BuildRecord>>,
    batch_size: usize,
}

impl SearchAdapter {
    /// Create an unconfigured adapter. Call
    /// [`configure`](SearchAdapter::configure) before indexing.
    pub fn new(rebuild: &RebuildConfig) -> Self {
        Self {
            engine: RwLock::new(None),
            state: Mutex::new(ConnectionState::Unconfigured),
            job_locks: Mutex::new(HashMap::new()),
            rebuild_epoch: AtomicU64::new(0),
            rebuilding: AtomicBool::new(false),
            live_overlap: Mutex::new(Vec::new()),
            batch_size: rebuild.batch_size,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().unwrap() = next;
    }

    /// (Re)point the adapter at a search engine.
    ///
    /// Instantiates the configured engine variant and verifies reachability
    /// with a ping. On success the prior connection (if any) is dropped and
    /// the adapter is `Ready`; an in-flight rebuild against the old engine
    /// is cancelled.
    ///
    /// # Errors
    ///
    /// [`BackendError::Configuration`] when the backend is disabled, the
    /// kind is unknown, or the endpoint does not answer the ping;
    /// [`BackendError::Closed`] after shutdown.
    pub async fn configure(&self, backend: &BackendConfig, retry: &RetryConfig) -> Result<()> {
        if self.state() == ConnectionState::Closed {
            return Err(BackendError::Closed);
        }
        self.set_state(ConnectionState::Connecting);

        let engine = match create_engine(backend, retry) {
            Ok(engine) => engine,
            Err(e) => {
                self.set_state(ConnectionState::Unconfigured);
                return Err(e);
            }
        };

        if let Err(e) = engine.ping().await {
            self.set_state(ConnectionState::Unconfigured);
            return Err(BackendError::Configuration(format!(
                "endpoint unreachable: {}",
                e
            )));
        }

        // Cancel any rebuild still targeting the previous engine.
        self.rebuild_epoch.fetch_add(1, Ordering::SeqCst);
        *self.engine.write().unwrap() = Some(engine);
        self.set_state(ConnectionState::Ready);
        info!(kind = backend.kind.as_str(), url = backend.base_url().as_str(), "backend configured");
        Ok(())
    }

    /// Clone the engine handle out, failing fast by state.
    fn engine(&self) -> Result<Arc<dyn SearchEngine>> {
        match self.state() {
            ConnectionState::Closed => Err(BackendError::Closed),
            ConnectionState::Degraded => Err(BackendError::Unavailable(
                "backend is degraded; reconnect pending".to_string(),
            )),
            ConnectionState::Unconfigured | ConnectionState::Connecting => Err(
                BackendError::Configuration("adapter is not configured".to_string()),
            ),
            ConnectionState::Ready => self
                .engine
                .read()
                .unwrap()
                .clone()
                .ok_or_else(|| BackendError::Configuration("adapter is not configured".to_string())),
        }
    }

    fn job_lock(&self, job: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.job_locks.lock().unwrap();
        // Drop locks nobody holds so the map does not grow with every job
        // name ever seen.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(job.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Mark the connection degraded after a transient failure. Indexing
    /// fails fast until [`try_reconnect`](SearchAdapter::try_reconnect)
    /// succeeds.
    fn mark_degraded(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == ConnectionState::Ready || *state == ConnectionState::Connecting {
            warn!("backend degraded; indexing will fail fast until reconnect");
            *state = ConnectionState::Degraded;
        }
    }

    /// Probe the engine and restore `Ready` from `Degraded`.
    pub async fn try_reconnect(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Ready => return Ok(()),
            ConnectionState::Closed => return Err(BackendError::Closed),
            ConnectionState::Unconfigured | ConnectionState::Connecting => {
                return Err(BackendError::Configuration(
                    "adapter is not configured".to_string(),
                ))
            }
            ConnectionState::Degraded => {}
        }

        let engine = self
            .engine
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| BackendError::Configuration("adapter is not configured".to_string()))?;

        self.set_state(ConnectionState::Connecting);
        match engine.ping().await {
            Ok(()) => {
                self.set_state(ConnectionState::Ready);
                info!("backend reconnected");
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Degraded);
                Err(BackendError::Unavailable(format!("ping failed: {}", e)))
            }
        }
    }

    /// Upsert the index document for one completed build.
    ///
    /// Idempotent: re-indexing the same `{job}#{number}` replaces the
    /// document, it never duplicates. Serialized against other mutations of
    /// the same job.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unavailable`] when the engine cannot be reached (the
    /// adapter transitions to `Degraded`; callers queue and retry).
    pub async fn index_build(&self, record: &BuildRecord) -> Result<()> {
        let engine = self.engine()?;
        let lock = self.job_lock(&record.job);
        let _guard = lock.lock().await;

        let doc = IndexDocument::from(record);
        debug!(id = doc.id.as_str(), "indexing build");
        let outcome = async {
            engine.add_documents(&[doc]).await?;
            engine.commit().await
        }
        .await;

        match outcome {
            Ok(()) => {
                if self.rebuilding.load(Ordering::SeqCst) {
                    // Replayed after the rebuild's clear so the build is
                    // not lost if it raced the delete.
                    self.live_overlap.lock().unwrap().push(record.clone());
                }
                Ok(())
            }
            Err(e) => {
                if e.is_transient() {
                    self.mark_degraded();
                }
                Err(e)
            }
        }
    }

    /// Delete all documents of one job. Idempotent no-op when none exist.
    pub async fn remove_job(&self, job: &str) -> Result<()> {
        let engine = self.engine()?;
        let lock = self.job_lock(job);
        let _guard = lock.lock().await;

        let outcome = async {
            engine.delete_job(job).await?;
            engine.commit().await
        }
        .await;

        match outcome {
            Ok(()) => {
                debug!(job, "job removed from index");
                Ok(())
            }
            Err(e) => {
                if e.is_transient() {
                    self.mark_degraded();
                }
                Err(e)
            }
        }
    }

    /// Clear the index and re-derive documents from the full set of known
    /// build records.
    ///
    /// Documents are written in per-job batches of the configured size,
    /// committed per batch. Returns the number of documents written from
    /// `records` (live builds replayed on top are not counted).
    ///
    /// # Errors
    ///
    /// [`BackendError::RebuildAborted`] when superseded by a newer rebuild,
    /// a reconfigure, or close; [`BackendError::Unavailable`] when the
    /// engine stays unreachable past the engine's own retry budget.
    pub async fn rebuild_from_clean(&self, records: &[BuildRecord]) -> Result<usize> {
        let engine = self.engine()?;
        let my_epoch = self.rebuild_epoch.fetch_add(1, Ordering::SeqCst) + 1;

        self.live_overlap.lock().unwrap().clear();
        self.rebuilding.store(true, Ordering::SeqCst);
        let result = self.run_rebuild(&engine, records, my_epoch).await;
        self.rebuilding.store(false, Ordering::SeqCst);

        if let Err(ref e) = result {
            if e.is_transient() {
                self.mark_degraded();
            }
        }
        result
    }

    async fn run_rebuild(
        &self,
        engine: &Arc<dyn SearchEngine>,
        records: &[BuildRecord],
        my_epoch: u64,
    ) -> Result<usize> {
        // Group per job so batches respect the per-job ordering contract.
        let mut by_job: BTreeMap<&str, Vec<&BuildRecord>> = BTreeMap::new();
        for record in records {
            by_job.entry(record.job.as_str()).or_default().push(record);
        }

        info!(
            builds = records.len(),
            jobs = by_job.len(),
            "starting clean rebuild"
        );

        self.check_rebuild_current(my_epoch)?;
        engine.delete_all().await?;
        engine.commit().await?;

        let mut written = 0usize;
        for (job, job_records) in &by_job {
            let lock = self.job_lock(job);
            let _guard = lock.lock().await;

            for chunk in job_records.chunks(self.batch_size) {
                self.check_rebuild_current(my_epoch)?;
                let docs: Vec<IndexDocument> =
                    chunk.iter().map(|r| IndexDocument::from(*r)).collect();
                engine.add_documents(&docs).await?;
                engine.commit().await?;
                written += docs.len();
                debug!(job, written, "rebuild batch committed");
            }
        }

        // Replay builds that completed while the rebuild was clearing and
        // writing. Deduplicated by id (newest wins) and written under the
        // job lock: a concurrent index holds the same lock for its whole
        // write, so it either lands before the replay (and shows up in the
        // post-drain overlap, making the drained copy stale) or after it.
        let drained: Vec<BuildRecord> = {
            let mut pending = self.live_overlap.lock().unwrap();
            std::mem::take(&mut *pending)
        };
        if !drained.is_empty() {
            let mut newest: BTreeMap<String, &BuildRecord> = BTreeMap::new();
            for record in &drained {
                newest.insert(record.doc_id(), record);
            }
            let mut replay_by_job: BTreeMap<&str, Vec<&BuildRecord>> = BTreeMap::new();
            for record in newest.into_values() {
                replay_by_job
                    .entry(record.job.as_str())
                    .or_default()
                    .push(record);
            }

            let mut replayed = 0usize;
            for (job, job_records) in &replay_by_job {
                let lock = self.job_lock(job);
                let _guard = lock.lock().await;
                self.check_rebuild_current(my_epoch)?;

                // Ids indexed again after the drain are already newer in
                // the engine; their drained copies must not overwrite them.
                let superseded: HashSet<String> = self
                    .live_overlap
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|r| r.doc_id())
                    .collect();
                let docs: Vec<IndexDocument> = job_records
                    .iter()
                    .filter(|r| !superseded.contains(&r.doc_id()))
                    .map(|r| IndexDocument::from(*r))
                    .collect();
                if docs.is_empty() {
                    continue;
                }
                engine.add_documents(&docs).await?;
                engine.commit().await?;
                replayed += docs.len();
            }
            if replayed > 0 {
                info!(replayed, "replayed live builds over rebuild");
            }
        }

        info!(written, "clean rebuild finished");
        Ok(written)
    }

    fn check_rebuild_current(&self, my_epoch: u64) -> Result<()> {
        if self.state() == ConnectionState::Closed {
            return Err(BackendError::RebuildAborted(
                "adapter closed during rebuild".to_string(),
            ));
        }
        if self.rebuild_epoch.load(Ordering::SeqCst) != my_epoch {
            return Err(BackendError::RebuildAborted(
                "superseded by a newer rebuild".to_string(),
            ));
        }
        Ok(())
    }

    /// Run a validated query, returning a lazy, restartable result cursor.
    ///
    /// # Errors
    ///
    /// [`BackendError::QuerySyntax`] on malformed input — detected before
    /// any engine call, so a bad query never touches the index.
    pub fn search(&self, raw_query: &str) -> Result<SearchResults> {
        query::validate(raw_query)?;
        let engine = self.engine()?;
        Ok(SearchResults::new(
            engine,
            raw_query.to_string(),
            DEFAULT_PAGE_SIZE,
        ))
    }

    /// Total documents in the index, probed from the engine.
    pub async fn document_count(&self) -> Result<usize> {
        self.engine()?.document_count().await
    }

    /// Swap the engine handle directly, bypassing configure. Test-only.
    #[cfg(test)]
    pub(crate) fn set_engine(&self, engine: Arc<dyn SearchEngine>) {
        *self.engine.write().unwrap() = Some(engine);
    }

    /// Shut the adapter down: cancels any in-flight rebuild, drops the
    /// engine handle, and makes every subsequent call fail with
    /// [`BackendError::Closed`]. Terminal.
    pub fn close(&self) {
        self.set_state(ConnectionState::Closed);
        self.rebuild_epoch.fetch_add(1, Ordering::SeqCst);
        *self.engine.write().unwrap() = None;
        info!("adapter closed");
    }
}
