//! Source-of-truth build history used by clean rebuilds.
//!
//! The event source owns build history; this module is how the adapter asks
//! for "the full set of known builds". The file-backed implementation scans
//! a directory of JSON build records, which is also what the CLI and the
//! integration tests feed from.

use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::HistoryConfig;
use crate::models::BuildRecord;

/// Provider of the complete known build history.
#[async_trait]
pub trait BuildHistory: Send + Sync {
    /// Every known build record, ordered by `(job, number)`.
    async fn all_builds(&self) -> Result<Vec<BuildRecord>>;
}

/// Build history backed by a directory of JSON record files.
///
/// Each matching file holds one serialized [`BuildRecord`]. Files that fail
/// to parse are skipped with a warning rather than failing the rebuild.
pub struct JsonFileHistory {
    dir: PathBuf,
    include: GlobSet,
}

impl JsonFileHistory {
    pub fn new(config: &HistoryConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.include_globs {
            let glob = Glob::new(pattern)
                .with_context(|| format!("Invalid history glob pattern: {}", pattern))?;
            builder.add(glob);
        }
        Ok(Self {
            dir: config.dir.clone(),
            include: builder.build()?,
        })
    }
}

#[async_trait]
impl BuildHistory for JsonFileHistory {
    async fn all_builds(&self) -> Result<Vec<BuildRecord>> {
        let mut records = Vec::new();

        if !self.dir.exists() {
            // An empty history is legal: a fresh install rebuilds to empty.
            return Ok(records);
        }

        for entry in WalkDir::new(&self.dir).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&self.dir).unwrap_or(entry.path());
            if !self.include.is_match(rel) {
                continue;
            }

            let content = std::fs::read_to_string(entry.path())
                .with_context(|| format!("Failed to read {}", entry.path().display()))?;
            match serde_json::from_str::<BuildRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        path = %entry.path().display(),
                        error = %e,
                        "skipping unparseable build record"
                    );
                }
            }
        }

        records.sort_by(|a, b| a.job.cmp(&b.job).then(a.number.cmp(&b.number)));
        Ok(records)
    }
}

/// Fixed in-memory history, for tests and embedding callers that already
/// hold their records.
pub struct StaticHistory {
    records: Vec<BuildRecord>,
}

impl StaticHistory {
    pub fn new(records: Vec<BuildRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl BuildHistory for StaticHistory {
    async fn all_builds(&self) -> Result<Vec<BuildRecord>> {
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuildStatus;
    use chrono::{TimeZone, Utc};

    fn write_record(dir: &std::path::Path, name: &str, job: &str, number: u32) {
        let record = BuildRecord {
            job: job.to_string(),
            number,
            status: BuildStatus::Success,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            log_text: "ok".to_string(),
            metadata: serde_json::Value::Null,
        };
        std::fs::write(dir.join(name), serde_json::to_string(&record).unwrap()).unwrap();
    }

    fn history_for(dir: &std::path::Path) -> JsonFileHistory {
        JsonFileHistory::new(&HistoryConfig {
            dir: dir.to_path_buf(),
            include_globs: vec!["**/*.json".to_string()],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_scans_and_orders_records() {
        let tmp = tempfile::tempdir().unwrap();
        write_record(tmp.path(), "b.json", "demo", 2);
        write_record(tmp.path(), "a.json", "demo", 1);
        write_record(tmp.path(), "c.json", "alpha", 7);

        let records = history_for(tmp.path()).all_builds().await.unwrap();
        let ids: Vec<String> = records.iter().map(|r| r.doc_id()).collect();
        assert_eq!(ids, vec!["alpha#7", "demo#1", "demo#2"]);
    }

    #[tokio::test]
    async fn test_skips_unparseable_and_non_matching_files() {
        let tmp = tempfile::tempdir().unwrap();
        write_record(tmp.path(), "good.json", "demo", 1);
        std::fs::write(tmp.path().join("broken.json"), "not json").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let records = history_for(tmp.path()).all_builds().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].doc_id(), "demo#1");
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty_history() {
        let tmp = tempfile::tempdir().unwrap();
        let history = history_for(&tmp.path().join("does-not-exist"));
        assert!(history.all_builds().await.unwrap().is_empty());
    }
}
