//! Error taxonomy for the search backend adapter.
//!
//! The library surfaces [`BackendError`] everywhere; binaries wrap it in
//! `anyhow` at the edge. The taxonomy matters operationally:
//!
//! | Variant | Retryable | Typical cause |
//! |---------|-----------|---------------|
//! | `Configuration` | no | malformed or unreachable endpoint at configure time |
//! | `Unavailable` | yes | engine down, timeout, HTTP 429/5xx |
//! | `QuerySyntax` | no | caller sent a malformed query |
//! | `RebuildAborted` | no | rebuild superseded or adapter closed mid-rebuild |
//! | `Closed` | no | operation after shutdown |
//! | `Protocol` | no | engine response the adapter cannot interpret |

use thiserror::Error;

/// All failures the adapter and its engines can report.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The endpoint is malformed or did not answer a ping at configure time.
    #[error("invalid backend configuration: {0}")]
    Configuration(String),

    /// The engine cannot be reached right now. Callers retry with backoff;
    /// the event bridge parks pending build records until reconnect.
    #[error("search backend unavailable: {0}")]
    Unavailable(String),

    /// The query string failed validation. Never retried; the index is
    /// untouched.
    #[error("malformed query: {0}")]
    QuerySyntax(String),

    /// An in-flight rebuild was cancelled by a newer rebuild or shutdown.
    /// The index is left at the last committed batch boundary.
    #[error("rebuild aborted: {0}")]
    RebuildAborted(String),

    /// The adapter has been shut down.
    #[error("adapter is closed")]
    Closed,

    /// The engine answered with something the adapter cannot interpret.
    /// Non-transient; aborts a rebuild rather than retrying.
    #[error("unexpected engine response: {0}")]
    Protocol(String),
}

impl BackendError {
    /// Whether a retry with backoff can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }

    /// Map a reqwest failure to the taxonomy: connect errors and timeouts
    /// are transient, everything else is a protocol problem.
    pub fn from_http(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            BackendError::Unavailable(err.to_string())
        } else {
            BackendError::Protocol(err.to_string())
        }
    }
}

/// Convenience alias used across the library.
pub type Result<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(BackendError::Unavailable("down".into()).is_transient());
        assert!(!BackendError::Configuration("bad".into()).is_transient());
        assert!(!BackendError::QuerySyntax("(".into()).is_transient());
        assert!(!BackendError::RebuildAborted("superseded".into()).is_transient());
        assert!(!BackendError::Closed.is_transient());
        assert!(!BackendError::Protocol("garbage".into()).is_transient());
    }
}
