//! Core data models used throughout Build Search.
//!
//! These types represent the build records, index documents, and search hits
//! that flow through the indexing and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Outcome of a completed build, as reported by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Success,
    Failure,
    Unstable,
    Aborted,
    NotBuilt,
}

impl BuildStatus {
    /// Canonical uppercase label, matching the wire/index representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Success => "SUCCESS",
            BuildStatus::Failure => "FAILURE",
            BuildStatus::Unstable => "UNSTABLE",
            BuildStatus::Aborted => "ABORTED",
            BuildStatus::NotBuilt => "NOT_BUILT",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed build of a job, as delivered by the event source.
///
/// Immutable once created. A re-run of the same build number produces a new
/// record with the same `(job, number)` identity that supersedes the old one
/// in the index (upsert by [`BuildRecord::doc_id`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Job name (e.g. `"platform-deploy"`).
    pub job: String,
    /// Build number within the job, starting at 1.
    pub number: u32,
    pub status: BuildStatus,
    /// Completion time of the build.
    pub timestamp: DateTime<Utc>,
    /// Console log text captured from the build.
    #[serde(default)]
    pub log_text: String,
    /// Free-form metadata (node, parameters, cause, ...), indexed as text.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl BuildRecord {
    /// Stable document identity: `{job}#{number}`.
    pub fn doc_id(&self) -> String {
        format!("{}#{}", self.job, self.number)
    }
}

/// The searchable projection of one [`BuildRecord`].
///
/// Derived only, never hand-edited; exactly one per build record once
/// indexing succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// `{job}#{number}` — the upsert key.
    pub id: String,
    pub job: String,
    pub number: u32,
    pub status: BuildStatus,
    /// Free-text content: log text plus flattened metadata.
    pub content: String,
    /// SHA-256 over the content, so callers can detect unchanged re-indexes.
    pub content_hash: String,
    /// Completion timestamp carried over from the record (epoch seconds).
    pub timestamp: i64,
}

impl From<&BuildRecord> for IndexDocument {
    fn from(record: &BuildRecord) -> Self {
        let mut content = record.log_text.clone();
        if !record.metadata.is_null() {
            let meta_text = flatten_metadata(&record.metadata);
            if !meta_text.is_empty() {
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str(&meta_text);
            }
        }
        let content_hash = hex::encode(Sha256::digest(content.as_bytes()));
        IndexDocument {
            id: record.doc_id(),
            job: record.job.clone(),
            number: record.number,
            status: record.status,
            content,
            content_hash,
            timestamp: record.timestamp.timestamp(),
        }
    }
}

/// Flatten a metadata value into whitespace-joined searchable text.
///
/// Keys are dropped; only scalar leaf values contribute terms.
fn flatten_metadata(value: &serde_json::Value) -> String {
    let mut parts: Vec<String> = Vec::new();
    collect_text(value, &mut parts);
    parts.join(" ")
}

fn collect_text(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Number(n) => out.push(n.to_string()),
        serde_json::Value::Bool(b) => out.push(b.to_string()),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_text(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_text(item, out);
            }
        }
        serde_json::Value::Null => {}
    }
}

/// One search result: a matching document plus its relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub doc: IndexDocument,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(job: &str, number: u32) -> BuildRecord {
        BuildRecord {
            job: job.to_string(),
            number,
            status: BuildStatus::Success,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            log_text: "Started by timer\nFinished: SUCCESS".to_string(),
            metadata: serde_json::json!({ "node": "agent-7", "params": ["fast", true] }),
        }
    }

    #[test]
    fn test_doc_id_format() {
        assert_eq!(record("demo", 3).doc_id(), "demo#3");
    }

    #[test]
    fn test_document_projection_carries_log_and_metadata() {
        let doc = IndexDocument::from(&record("demo", 1));
        assert_eq!(doc.id, "demo#1");
        assert_eq!(doc.job, "demo");
        assert_eq!(doc.number, 1);
        assert!(doc.content.contains("Finished: SUCCESS"));
        assert!(doc.content.contains("agent-7"));
        assert!(doc.content.contains("fast"));
    }

    #[test]
    fn test_content_hash_stable_for_same_record() {
        let a = IndexDocument::from(&record("demo", 1));
        let b = IndexDocument::from(&record("demo", 1));
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_content_hash_changes_with_log() {
        let mut r = record("demo", 1);
        let a = IndexDocument::from(&r);
        r.log_text.push_str("\nretrying");
        let b = IndexDocument::from(&r);
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_status_round_trips_through_serde() {
        let json = serde_json::to_string(&BuildStatus::NotBuilt).unwrap();
        assert_eq!(json, "\"NOT_BUILT\"");
        let back: BuildStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BuildStatus::NotBuilt);
    }
}
