//! # Build Search
//!
//! **A search backend adapter that indexes CI build records and makes them
//! queryable.**
//!
//! Build Search sits between a CI server's lifecycle events and a pluggable
//! search engine. Completed builds are projected into index documents and
//! upserted; deleted jobs are purged; a clean rebuild re-derives the whole
//! index from the source-of-truth build history, safely under concurrent
//! live indexing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Event Source │──▶│ EventBridge  │──▶│ SearchAdapter│──▶ SearchEngine
//! │ (CI server)  │   │ queue+retry  │   │ state machine│    (solr | memory)
//! └──────────────┘   └──────────────┘   └──────┬──────┘
//!                                              │
//!                              ┌───────────────┤
//!                              ▼               ▼
//!                         ┌─────────┐    ┌──────────┐
//!                         │   CLI   │    │   HTTP   │
//!                         │  (bsx)  │    │   API    │
//!                         └─────────┘    └──────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. The event source reports a completed build ([`models::BuildRecord`])
//!    to the [`events::EventBridge`].
//! 2. The bridge asks the [`adapter::SearchAdapter`] to upsert the derived
//!    [`models::IndexDocument`]; if the engine is away, the build is parked
//!    and retried with backoff.
//! 3. The adapter serializes mutations per job, talks to the configured
//!    [`backend::SearchEngine`] variant, and commits.
//! 4. Queries are validated ([`query`]), then served as a lazy, restartable
//!    [`query::SearchResults`] cursor.
//! 5. A rebuild loads [`history::BuildHistory`], clears the index, and
//!    re-derives every document in committed batches.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types: `BuildRecord`, `IndexDocument`, `SearchHit` |
//! | [`error`] | `BackendError` taxonomy (`thiserror`) |
//! | [`backend`] | `SearchEngine` capability trait and factory |
//! | [`backend_solr`] | Solr-style HTTP+JSON engine with retry/backoff |
//! | [`backend_memory`] | In-memory engine for tests and networkless use |
//! | [`adapter`] | Connection state machine, per-job ordering, rebuild |
//! | [`query`] | Query parsing/validation and the lazy result cursor |
//! | [`events`] | Inbound lifecycle events, pending queue, retry loop |
//! | [`history`] | Source-of-truth build history providers |
//! | [`server`] | Operational HTTP API (axum) |

pub mod adapter;
pub mod backend;
pub mod backend_memory;
pub mod backend_solr;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod models;
pub mod query;
pub mod server;

pub use adapter::{ConnectionState, SearchAdapter};
pub use backend::SearchEngine;
pub use error::BackendError;
pub use events::EventBridge;
pub use history::{BuildHistory, JsonFileHistory, StaticHistory};
pub use models::{BuildRecord, BuildStatus, IndexDocument, SearchHit};
pub use query::SearchResults;
