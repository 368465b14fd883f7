//! In-memory [`SearchEngine`] implementation.
//!
//! Backs `kind = "memory"` deployments and the test suite. Documents live
//! in a `HashMap` behind `std::sync::RwLock`; mutations are staged and only
//! become visible to search on [`commit`](SearchEngine::commit), mirroring
//! the commit semantics of the HTTP engine. Relevance is a simple weighted
//! term-match score, brute-forced over all visible documents.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use crate::backend::SearchEngine;
use crate::error::Result;
use crate::models::{IndexDocument, SearchHit};
use crate::query::{self, Query, QueryField};

enum StagedOp {
    Upsert(IndexDocument),
    DeleteJob(String),
    DeleteAll,
}

/// In-memory engine for tests and networkless deployments.
pub struct InMemoryEngine {
    /// Documents visible to search, keyed by document id.
    visible: RwLock<HashMap<String, IndexDocument>>,
    /// Mutations applied but not yet committed, in arrival order.
    staged: Mutex<Vec<StagedOp>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            visible: RwLock::new(HashMap::new()),
            staged: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchEngine for InMemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn add_documents(&self, docs: &[IndexDocument]) -> Result<()> {
        let mut staged = self.staged.lock().unwrap();
        for doc in docs {
            staged.push(StagedOp::Upsert(doc.clone()));
        }
        Ok(())
    }

    async fn delete_job(&self, job: &str) -> Result<()> {
        let mut staged = self.staged.lock().unwrap();
        staged.push(StagedOp::DeleteJob(job.to_string()));
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        let mut staged = self.staged.lock().unwrap();
        staged.push(StagedOp::DeleteAll);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let ops: Vec<StagedOp> = {
            let mut staged = self.staged.lock().unwrap();
            std::mem::take(&mut *staged)
        };
        let mut visible = self.visible.write().unwrap();
        for op in ops {
            match op {
                StagedOp::Upsert(doc) => {
                    visible.insert(doc.id.clone(), doc);
                }
                StagedOp::DeleteJob(job) => {
                    visible.retain(|_, doc| doc.job != job);
                }
                StagedOp::DeleteAll => {
                    visible.clear();
                }
            }
        }
        Ok(())
    }

    async fn search(&self, raw: &str, start: usize, rows: usize) -> Result<Vec<SearchHit>> {
        let parsed = query::parse(raw)?;
        let visible = self.visible.read().unwrap();

        let mut hits: Vec<SearchHit> = visible
            .values()
            .filter_map(|doc| {
                let score = score_document(&parsed, doc);
                (score > 0.0).then(|| SearchHit {
                    doc: doc.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.doc.id.cmp(&b.doc.id))
        });

        Ok(hits.into_iter().skip(start).take(rows).collect())
    }

    async fn document_count(&self) -> Result<usize> {
        Ok(self.visible.read().unwrap().len())
    }
}

/// Per-field match weights: id exact 5.0, job exact 3.0, status exact 2.0,
/// content occurrence 1.0 each. A document scores only if every matched
/// weight sums above zero, i.e. at least one clause matches.
fn score_document(query: &Query, doc: &IndexDocument) -> f64 {
    let content_lower = doc.content.to_lowercase();
    let mut score = 0.0;

    for clause in &query.clauses {
        let term = clause.term.as_str();
        let term_lower = term.to_lowercase();
        match clause.field {
            Some(QueryField::Id) => {
                if doc.id == term {
                    score += 5.0;
                }
            }
            Some(QueryField::Job) => {
                if doc.job == term {
                    score += 3.0;
                }
            }
            Some(QueryField::Status) => {
                if doc.status.as_str().eq_ignore_ascii_case(term) {
                    score += 2.0;
                }
            }
            Some(QueryField::Content) => {
                score += content_occurrences(&content_lower, &term_lower);
            }
            None => {
                if doc.id == term {
                    score += 5.0;
                }
                if doc.job == term {
                    score += 3.0;
                }
                score += content_occurrences(&content_lower, &term_lower);
            }
        }
    }

    score
}

fn content_occurrences(content_lower: &str, term_lower: &str) -> f64 {
    if term_lower.is_empty() {
        return 0.0;
    }
    content_lower.matches(term_lower).count() as f64
}
