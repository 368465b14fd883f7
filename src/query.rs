//! Query parsing, validation, and the lazy result cursor.
//!
//! The query language is deliberately small and shared by every engine:
//! whitespace-separated clauses, `field:term` to qualify a field (`id`,
//! `job`, `status`, `content`), `"quoted phrase"` to keep whitespace, and
//! parentheses for grouping. Clauses are OR-ed; relevance is how many
//! clauses a document matches (weighted per field by the engine).
//!
//! Validation runs before any network call, so a malformed query never
//! touches the index ([`crate::error::BackendError::QuerySyntax`]).

use std::fmt;
use std::sync::Arc;

use crate::backend::SearchEngine;
use crate::error::{BackendError, Result};
use crate::models::SearchHit;

/// A field a clause can be qualified with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryField {
    Id,
    Job,
    Status,
    Content,
}

impl QueryField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(QueryField::Id),
            "job" => Some(QueryField::Job),
            "status" => Some(QueryField::Status),
            "content" => Some(QueryField::Content),
            _ => None,
        }
    }
}

/// One clause of a parsed query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryClause {
    /// `None` means the bare term matches id, job, or content.
    pub field: Option<QueryField>,
    pub term: String,
}

/// A validated, parsed query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub clauses: Vec<QueryClause>,
}

/// Parse and validate a raw query string.
///
/// # Errors
///
/// Returns [`BackendError::QuerySyntax`] on an empty query, unbalanced
/// parentheses, an unterminated quote, an unknown field name, or a
/// dangling `field:` with no term.
pub fn parse(raw: &str) -> Result<Query> {
    if raw.trim().is_empty() {
        return Err(BackendError::QuerySyntax("query is empty".to_string()));
    }

    let mut clauses = Vec::new();
    let mut chars = raw.chars().peekable();
    let mut depth: i32 = 0;
    let mut pending_field: Option<QueryField> = None;

    while let Some(&c) = chars.peek() {
        match c {
            '(' => {
                chars.next();
                depth += 1;
            }
            ')' => {
                chars.next();
                depth -= 1;
                if depth < 0 {
                    return Err(BackendError::QuerySyntax(
                        "unbalanced parenthesis: ')' without '('".to_string(),
                    ));
                }
            }
            '"' => {
                chars.next();
                let mut phrase = String::new();
                let mut terminated = false;
                for pc in chars.by_ref() {
                    if pc == '"' {
                        terminated = true;
                        break;
                    }
                    phrase.push(pc);
                }
                if !terminated {
                    return Err(BackendError::QuerySyntax("unterminated quote".to_string()));
                }
                if phrase.trim().is_empty() {
                    return Err(BackendError::QuerySyntax("empty phrase".to_string()));
                }
                clauses.push(QueryClause {
                    field: pending_field.take(),
                    term: phrase,
                });
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut word = String::new();
                while let Some(&wc) = chars.peek() {
                    if wc.is_whitespace() || wc == '(' || wc == ')' || wc == '"' {
                        break;
                    }
                    word.push(wc);
                    chars.next();
                }
                if let Some(rest) = word.strip_suffix(':') {
                    // `field:"phrase"` or `field:(...)` — remember the field.
                    let field = QueryField::parse(rest).ok_or_else(|| {
                        BackendError::QuerySyntax(format!("unknown field: '{}'", rest))
                    })?;
                    pending_field = Some(field);
                } else if let Some((name, term)) = word.split_once(':') {
                    let field = QueryField::parse(name).ok_or_else(|| {
                        BackendError::QuerySyntax(format!("unknown field: '{}'", name))
                    })?;
                    clauses.push(QueryClause {
                        field: Some(field),
                        term: term.to_string(),
                    });
                } else {
                    clauses.push(QueryClause {
                        field: pending_field.take(),
                        term: word,
                    });
                }
            }
        }
    }

    if depth != 0 {
        return Err(BackendError::QuerySyntax(
            "unbalanced parenthesis: '(' without ')'".to_string(),
        ));
    }
    if pending_field.is_some() {
        return Err(BackendError::QuerySyntax(
            "field qualifier without a term".to_string(),
        ));
    }
    if clauses.is_empty() {
        return Err(BackendError::QuerySyntax(
            "query has no searchable terms".to_string(),
        ));
    }

    Ok(Query { clauses })
}

/// Validate a raw query without keeping the parse.
pub fn validate(raw: &str) -> Result<()> {
    parse(raw).map(|_| ())
}

// ============ Result cursor ============

/// Default page size for [`SearchResults`].
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// A lazy, finite, restartable sequence of search hits.
///
/// Pages are fetched from the engine on demand; nothing is requested until
/// the first [`next`](SearchResults::next) call. [`restart`](SearchResults::restart)
/// rewinds to the beginning and re-queries, so a consumer can observe index
/// changes between passes.
pub struct SearchResults {
    engine: Arc<dyn SearchEngine>,
    query: String,
    page_size: usize,
    /// Offset of the next page to fetch.
    offset: usize,
    buffer: std::collections::VecDeque<SearchHit>,
    exhausted: bool,
}

impl fmt::Debug for SearchResults {
    // The engine handle is a trait object; show the cursor position instead.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchResults")
            .field("query", &self.query)
            .field("offset", &self.offset)
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl SearchResults {
    pub fn new(engine: Arc<dyn SearchEngine>, query: String, page_size: usize) -> Self {
        Self {
            engine,
            query,
            page_size: page_size.max(1),
            offset: 0,
            buffer: std::collections::VecDeque::new(),
            exhausted: false,
        }
    }

    /// The raw query this cursor was created from.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Fetch the next hit, paging from the engine as needed.
    ///
    /// Returns `Ok(None)` once the sequence is exhausted.
    pub async fn next(&mut self) -> Result<Option<SearchHit>> {
        if self.buffer.is_empty() && !self.exhausted {
            let page = self
                .engine
                .search(&self.query, self.offset, self.page_size)
                .await?;
            if page.len() < self.page_size {
                self.exhausted = true;
            }
            self.offset += page.len();
            self.buffer.extend(page);
        }
        Ok(self.buffer.pop_front())
    }

    /// Rewind to the start; the next call re-queries the engine.
    pub fn restart(&mut self) {
        self.offset = 0;
        self.buffer.clear();
        self.exhausted = false;
    }

    /// Drain up to `limit` hits into a vector.
    pub async fn take(&mut self, limit: usize) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::new();
        while hits.len() < limit {
            match self.next().await? {
                Some(hit) => hits.push(hit),
                None => break,
            }
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_terms() {
        let q = parse("demo deploy").unwrap();
        assert_eq!(q.clauses.len(), 2);
        assert_eq!(q.clauses[0].field, None);
        assert_eq!(q.clauses[0].term, "demo");
    }

    #[test]
    fn test_field_qualified_term() {
        let q = parse("job:demo").unwrap();
        assert_eq!(q.clauses.len(), 1);
        assert_eq!(q.clauses[0].field, Some(QueryField::Job));
        assert_eq!(q.clauses[0].term, "demo");
    }

    #[test]
    fn test_id_term_keeps_hash() {
        let q = parse("id:demo#1").unwrap();
        assert_eq!(q.clauses[0].term, "demo#1");
    }

    #[test]
    fn test_quoted_phrase() {
        let q = parse("\"Finished: SUCCESS\"").unwrap();
        assert_eq!(q.clauses[0].term, "Finished: SUCCESS");
    }

    #[test]
    fn test_field_qualified_phrase() {
        let q = parse("content:\"out of memory\"").unwrap();
        assert_eq!(q.clauses[0].field, Some(QueryField::Content));
        assert_eq!(q.clauses[0].term, "out of memory");
    }

    #[test]
    fn test_parens_group() {
        let q = parse("(demo deploy) status:FAILURE").unwrap();
        assert_eq!(q.clauses.len(), 3);
    }

    #[test]
    fn test_unbalanced_open_paren_rejected() {
        let err = parse("(demo").unwrap_err();
        assert!(matches!(err, BackendError::QuerySyntax(_)));
    }

    #[test]
    fn test_unbalanced_close_paren_rejected() {
        let err = parse("demo)").unwrap_err();
        assert!(matches!(err, BackendError::QuerySyntax(_)));
    }

    #[test]
    fn test_unterminated_quote_rejected() {
        let err = parse("\"demo").unwrap_err();
        assert!(matches!(err, BackendError::QuerySyntax(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse("node:agent-7").unwrap_err();
        assert!(matches!(err, BackendError::QuerySyntax(_)));
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(parse("   ").is_err());
        assert!(parse("()").is_err());
    }

    #[test]
    fn test_dangling_field_rejected() {
        let err = parse("job:").unwrap_err();
        assert!(matches!(err, BackendError::QuerySyntax(_)));
    }

    #[test]
    fn test_results_debug_shows_cursor_state() {
        let results = SearchResults::new(
            Arc::new(crate::backend_memory::InMemoryEngine::new()),
            "job:demo".to_string(),
            10,
        );
        let rendered = format!("{:?}", results);
        assert!(rendered.contains("job:demo"));
        assert!(rendered.contains("exhausted"));
    }
}
