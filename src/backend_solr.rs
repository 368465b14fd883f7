//! Solr-style HTTP+JSON [`SearchEngine`] implementation.
//!
//! Talks to a Solr core over its JSON update and select APIs:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | add documents | `POST /solr/{core}/update` with a JSON array of docs |
//! | delete job | `POST /solr/{core}/update` with `{"delete":{"query":"job:\"…\""}}` |
//! | delete all | `POST /solr/{core}/update` with `{"delete":{"query":"*:*"}}` |
//! | commit | `POST /solr/{core}/update?commit=true` with `{}` |
//! | search | `GET /solr/{core}/select?q=…&start=…&rows=…&fl=*,score&wt=json` |
//! | ping | `GET /solr/{core}/admin/ping` |
//!
//! # Retry Strategy
//!
//! Transient failures are retried with exponential backoff before the error
//! is surfaced as [`BackendError::Unavailable`]:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 400 on select → [`BackendError::QuerySyntax`], no retry
//! - other HTTP 4xx → [`BackendError::Protocol`], no retry
//! - connect errors and timeouts → retry
//! - Backoff: base, 2×base, 4×base, ... (exponent capped at 2^5)

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use async_trait::async_trait;

use crate::backend::SearchEngine;
use crate::config::{BackendConfig, RetryConfig};
use crate::error::{BackendError, Result};
use crate::models::{IndexDocument, SearchHit};

/// HTTP client for one Solr core.
pub struct SolrEngine {
    update_url: String,
    select_url: String,
    ping_url: String,
    client: reqwest::Client,
    max_retries: u32,
    base_backoff: Duration,
}

impl SolrEngine {
    pub fn new(backend: &BackendConfig, retry: &RetryConfig) -> Result<Self> {
        let base = backend.base_url();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(retry.timeout_secs))
            .build()
            .map_err(|e| BackendError::Configuration(e.to_string()))?;

        Ok(Self {
            update_url: format!("{}/solr/{}/update", base, backend.core),
            select_url: format!("{}/solr/{}/select", base, backend.core),
            ping_url: format!("{}/solr/{}/admin/ping", base, backend.core),
            client,
            max_retries: retry.max_retries,
            base_backoff: Duration::from_millis(retry.base_backoff_ms),
        })
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        // attempt >= 1 here; exponent capped so the delay stays bounded.
        self.base_backoff * (1u32 << (attempt - 1).min(5))
    }

    /// POST a JSON body to the update endpoint, retrying transient failures.
    async fn post_update(&self, body: &serde_json::Value, commit: bool) -> Result<()> {
        let url = if commit {
            format!("{}?commit=true", self.update_url)
        } else {
            self.update_url.clone()
        };

        let mut last_err = BackendError::Unavailable("no attempt made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying update");
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&url).json(body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        let text = response.text().await.unwrap_or_default();
                        last_err =
                            BackendError::Unavailable(format!("engine error {}: {}", status, text));
                        continue;
                    }
                    let text = response.text().await.unwrap_or_default();
                    return Err(BackendError::Protocol(format!(
                        "engine rejected update with {}: {}",
                        status, text
                    )));
                }
                Err(e) => {
                    let mapped = BackendError::from_http(e);
                    if !mapped.is_transient() {
                        return Err(mapped);
                    }
                    last_err = mapped;
                    continue;
                }
            }
        }

        Err(last_err)
    }
}

#[async_trait]
impl SearchEngine for SolrEngine {
    fn name(&self) -> &str {
        "solr"
    }

    async fn ping(&self) -> Result<()> {
        let resp = self
            .client
            .get(&self.ping_url)
            .send()
            .await
            .map_err(BackendError::from_http)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Unavailable(format!(
                "ping returned {}",
                resp.status()
            )))
        }
    }

    async fn add_documents(&self, docs: &[IndexDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_value(docs)
            .map_err(|e| BackendError::Protocol(format!("cannot serialize documents: {}", e)))?;
        debug!(count = docs.len(), "adding documents");
        self.post_update(&body, false).await
    }

    async fn delete_job(&self, job: &str) -> Result<()> {
        // Quoted so job names with spaces or colons stay one term.
        let body = json!({ "delete": { "query": format!("job:\"{}\"", escape_phrase(job)) } });
        self.post_update(&body, false).await
    }

    async fn delete_all(&self) -> Result<()> {
        let body = json!({ "delete": { "query": "*:*" } });
        self.post_update(&body, false).await
    }

    async fn commit(&self) -> Result<()> {
        self.post_update(&json!({}), true).await
    }

    async fn search(&self, query: &str, start: usize, rows: usize) -> Result<Vec<SearchHit>> {
        let start_param = start.to_string();
        let rows_param = rows.to_string();
        let mut last_err = BackendError::Unavailable("no attempt made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }

            let resp = self
                .client
                .get(&self.select_url)
                .query(&[
                    ("q", query),
                    ("start", start_param.as_str()),
                    ("rows", rows_param.as_str()),
                    ("fl", "*,score"),
                    ("wt", "json"),
                ])
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body: serde_json::Value =
                            response.json().await.map_err(BackendError::from_http)?;
                        return parse_select_response(&body);
                    }
                    if status.as_u16() == 400 {
                        let text = response.text().await.unwrap_or_default();
                        return Err(BackendError::QuerySyntax(text));
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err =
                            BackendError::Unavailable(format!("select returned {}", status));
                        continue;
                    }
                    return Err(BackendError::Protocol(format!(
                        "select returned {}",
                        status
                    )));
                }
                Err(e) => {
                    let mapped = BackendError::from_http(e);
                    if !mapped.is_transient() {
                        return Err(mapped);
                    }
                    last_err = mapped;
                    continue;
                }
            }
        }

        Err(last_err)
    }

    async fn document_count(&self) -> Result<usize> {
        let resp = self
            .client
            .get(&self.select_url)
            .query(&[("q", "*:*"), ("rows", "0"), ("wt", "json")])
            .send()
            .await
            .map_err(BackendError::from_http)?;
        if !resp.status().is_success() {
            return Err(BackendError::Unavailable(format!(
                "count query returned {}",
                resp.status()
            )));
        }
        let body: serde_json::Value = resp.json().await.map_err(BackendError::from_http)?;
        body.pointer("/response/numFound")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .ok_or_else(|| BackendError::Protocol("select response missing numFound".to_string()))
    }
}

/// Escape a value for inclusion inside a quoted query phrase, so names
/// containing `"` or `\` cannot break out of the term.
fn escape_phrase(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Extract `response.docs` from a select response into scored hits.
fn parse_select_response(body: &serde_json::Value) -> Result<Vec<SearchHit>> {
    let docs = body
        .pointer("/response/docs")
        .and_then(|d| d.as_array())
        .ok_or_else(|| BackendError::Protocol("select response missing docs array".to_string()))?;

    let mut hits = Vec::with_capacity(docs.len());
    for raw in docs {
        let score = raw.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0);
        let doc: IndexDocument = serde_json::from_value(raw.clone())
            .map_err(|e| BackendError::Protocol(format!("cannot parse document: {}", e)))?;
        hits.push(SearchHit { doc, score });
    }
    Ok(hits)
}
