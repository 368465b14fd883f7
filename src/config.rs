//! TOML configuration parsing and validation.
//!
//! All settings live in a single TOML file passed via `--config`. Defaults
//! target a local Solr-style engine on port 8983; `kind = "memory"` runs
//! entirely in-process, which is what the test suite uses.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rebuild: RebuildConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Connection settings for the search engine.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Engine variant: `"solr"` (HTTP+JSON) or `"memory"` (in-process).
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Core/collection name on the engine.
    #[serde(default = "default_core")]
    pub core: String,
    /// When false, the adapter refuses to configure and indexing is off.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl BackendConfig {
    /// Base URL of the engine, e.g. `http://localhost:8983`.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn default_kind() -> String {
    "solr".to_string()
}
fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    8983
}
fn default_core() -> String {
    "builds".to_string()
}
fn default_enabled() -> bool {
    true
}

/// Retry/backoff policy for transient engine failures.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff step; doubles per attempt, capped at `2^5` steps.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Per-request timeout for engine HTTP calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}
fn default_base_backoff_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}

/// Batching policy for clean rebuilds.
#[derive(Debug, Deserialize, Clone)]
pub struct RebuildConfig {
    /// Documents per committed batch. Each batch boundary is a consistent
    /// abort point.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    200
}

/// Where the source-of-truth build records live.
#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    /// Directory scanned recursively for build record files.
    #[serde(default = "default_history_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: default_history_dir(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("./builds")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7431".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    match config.backend.kind.as_str() {
        "solr" | "memory" => {}
        other => anyhow::bail!("Unknown backend kind: '{}'. Must be solr or memory.", other),
    }

    if config.backend.host.trim().is_empty() {
        anyhow::bail!("backend.host must not be empty");
    }

    if config.backend.core.trim().is_empty() {
        anyhow::bail!("backend.core must not be empty");
    }

    if config.rebuild.batch_size == 0 {
        anyhow::bail!("rebuild.batch_size must be > 0");
    }

    if config.retry.timeout_secs == 0 {
        anyhow::bail!("retry.timeout_secs must be > 0");
    }

    Ok(config)
}
