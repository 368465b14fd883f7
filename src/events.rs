//! Inbound lifecycle event surface.
//!
//! [`EventBridge`] is what the event source (the CI server) talks to:
//! `on_build_completed`, `on_job_deleted`, `on_rebuild_requested`. It owns
//! the retry policy the adapter itself deliberately does not have: when the
//! backend is unavailable, completed builds are parked in a pending queue
//! (deduplicated by document id, newest wins) and flushed once
//! [`SearchAdapter::try_reconnect`] succeeds. A background retry loop
//! drives reconnect plus flush with exponential backoff.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::adapter::{ConnectionState, SearchAdapter};
use crate::error::{BackendError, Result};
use crate::history::BuildHistory;
use crate::models::BuildRecord;

/// Bridge between lifecycle events and the adapter.
pub struct EventBridge {
    adapter: Arc<SearchAdapter>,
    history: Arc<dyn BuildHistory>,
    /// Builds waiting for the backend to come back, keyed by doc id.
    pending: Mutex<HashMap<String, BuildRecord>>,
}

impl EventBridge {
    pub fn new(adapter: Arc<SearchAdapter>, history: Arc<dyn BuildHistory>) -> Self {
        Self {
            adapter,
            history,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn adapter(&self) -> &Arc<SearchAdapter> {
        &self.adapter
    }

    /// Number of builds parked for retry.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// A build finished: index it now, or park it if the backend is away.
    ///
    /// Transient unavailability is absorbed here (the record is queued and
    /// the call succeeds); non-transient errors propagate to the caller.
    pub async fn on_build_completed(&self, record: BuildRecord) -> Result<()> {
        match self.adapter.index_build(&record).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => {
                warn!(id = record.doc_id().as_str(), "backend away; parking build for retry");
                self.pending
                    .lock()
                    .unwrap()
                    .insert(record.doc_id(), record);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// A job was deleted: drop its documents and any parked builds.
    pub async fn on_job_deleted(&self, job: &str) -> Result<()> {
        self.pending
            .lock()
            .unwrap()
            .retain(|_, record| record.job != job);
        self.adapter.remove_job(job).await
    }

    /// A full rebuild was requested: load the known history and re-index
    /// from clean. Returns the number of documents written.
    pub async fn on_rebuild_requested(&self) -> anyhow::Result<usize> {
        let records = self.history.all_builds().await?;
        let written = self.adapter.rebuild_from_clean(&records).await?;
        Ok(written)
    }

    /// Index every parked build. Stops at the first transient failure and
    /// re-parks the remainder.
    pub async fn flush_pending(&self) -> Result<usize> {
        let parked: Vec<BuildRecord> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().map(|(_, record)| record).collect()
        };
        if parked.is_empty() {
            return Ok(0);
        }

        let mut flushed = 0usize;
        let mut iter = parked.into_iter();
        while let Some(record) = iter.next() {
            match self.adapter.index_build(&record).await {
                Ok(()) => flushed += 1,
                Err(e) => {
                    // Never attempted builds go back in the queue; only the
                    // record that actually failed is dropped for permanent
                    // errors.
                    let mut pending = self.pending.lock().unwrap();
                    if e.is_transient() {
                        pending.insert(record.doc_id(), record);
                    }
                    for rest in iter {
                        pending.insert(rest.doc_id(), rest);
                    }
                    return Err(e);
                }
            }
        }

        info!(flushed, "flushed parked builds");
        Ok(flushed)
    }

    /// Background loop: while the adapter is degraded, probe with
    /// exponential backoff; once ready, flush the queue. Exits when the
    /// adapter closes.
    pub async fn run_retry_loop(&self, base_delay: Duration) {
        let mut attempt: u32 = 0;
        loop {
            match self.adapter.state() {
                ConnectionState::Closed => return,
                ConnectionState::Degraded => {
                    attempt += 1;
                    let delay = base_delay * (1u32 << (attempt - 1).min(5));
                    tokio::time::sleep(delay).await;
                    if self.adapter.try_reconnect().await.is_err() {
                        continue;
                    }
                    attempt = 0;
                }
                ConnectionState::Ready => {
                    if self.pending_len() > 0 && self.flush_pending().await.is_err() {
                        continue;
                    }
                    tokio::time::sleep(base_delay).await;
                }
                // Not configured yet; nothing to retry against.
                _ => tokio::time::sleep(base_delay).await,
            }
        }
    }
}
