//! In-memory [`SearchBackend`] implementation for tests.
//!
//! Indexes and aliases live behind `std::sync::RwLock`. Search is a
//! case-insensitive substring match of the query words against the
//! `query_by` fields, and understands the filter forms the structured
//! compiler emits (`[a..b]`, `>=`, `<=`, `>`, `<`, `=`, `prefix*`, plain
//! values) joined with `&&`. Like the real server, it does not resolve
//! aliases on search; callers must pass index names.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::SearchBackend;
use crate::error::BackendError;
use crate::highlight::{mark_text, MARK_CLOSE, MARK_OPEN};
use crate::models::{
    Alias, Document, Highlight, Hit, IndexSchema, SearchParameters, SearchResponse,
    MATCH_ALL,
};

struct StoredIndex {
    schema: IndexSchema,
    docs: Vec<Document>,
}

/// In-memory backend for tests.
#[derive(Default)]
pub struct InMemoryBackend {
    indexes: RwLock<BTreeMap<String, StoredIndex>>,
    aliases: RwLock<Vec<Alias>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_indexes(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredIndex>> {
        self.indexes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_indexes(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredIndex>> {
        self.indexes.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_index(&self, schema: IndexSchema) {
        self.write_indexes().insert(
            schema.name.clone(),
            StoredIndex {
                schema,
                docs: Vec::new(),
            },
        );
    }

    pub fn drop_index(&self, name: &str) {
        self.write_indexes().remove(name);
    }

    /// Add documents to an existing index. Unknown indexes are ignored.
    pub fn add_documents(&self, index: &str, docs: impl IntoIterator<Item = Value>) {
        let mut indexes = self.write_indexes();
        if let Some(stored) = indexes.get_mut(index) {
            for doc in docs {
                if let Value::Object(map) = doc {
                    stored.docs.push(map);
                }
            }
            stored.schema.num_documents = stored.docs.len() as u64;
        }
    }

    pub fn set_alias(&self, alias: Alias) {
        let mut aliases = self.aliases.write().unwrap_or_else(PoisonError::into_inner);
        aliases.retain(|a| a.name != alias.name);
        aliases.push(alias);
    }
}

fn not_found(index: &str) -> BackendError {
    BackendError::NotFound {
        message: format!("Could not find a collection with name `{}`.", index),
    }
}

fn bad_request(message: String) -> BackendError {
    BackendError::Rejected {
        status: 400,
        message,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One `field:expr` clause of a filter.
#[derive(Debug, PartialEq)]
enum Clause {
    Range(f64, f64),
    Cmp(CmpOp, f64),
    Prefix(String),
    Equals(String),
}

#[derive(Debug, PartialEq, Clone, Copy)]
enum CmpOp {
    Ge,
    Le,
    Gt,
    Lt,
}

fn number(field: &str, raw: &str) -> Result<f64, BackendError> {
    raw.trim().parse::<f64>().map_err(|_| {
        bad_request(format!(
            "Error with filter field `{}`: Not a valid number.",
            field
        ))
    })
}

fn parse_filter(schema: &IndexSchema, filter: &str) -> Result<Vec<(String, Clause)>, BackendError> {
    let mut clauses = Vec::new();
    for part in filter.split("&&") {
        let part = part.trim();
        let (field, expr) = part
            .split_once(':')
            .ok_or_else(|| bad_request("Could not parse the filter query.".to_string()))?;
        let field = field.trim();
        if schema.field(field).is_none() {
            return Err(bad_request(format!(
                "Could not find a filter field named `{}` in the schema.",
                field
            )));
        }
        let expr = expr.trim();
        let clause = if let Some(inner) = expr.strip_prefix('[').and_then(|e| e.strip_suffix(']')) {
            let (lo, hi) = inner
                .split_once("..")
                .ok_or_else(|| bad_request("Could not parse the filter query.".to_string()))?;
            Clause::Range(number(field, lo)?, number(field, hi)?)
        } else if let Some(v) = expr.strip_prefix(">=") {
            Clause::Cmp(CmpOp::Ge, number(field, v)?)
        } else if let Some(v) = expr.strip_prefix("<=") {
            Clause::Cmp(CmpOp::Le, number(field, v)?)
        } else if let Some(v) = expr.strip_prefix('>') {
            Clause::Cmp(CmpOp::Gt, number(field, v)?)
        } else if let Some(v) = expr.strip_prefix('<') {
            Clause::Cmp(CmpOp::Lt, number(field, v)?)
        } else if let Some(v) = expr.strip_suffix('*') {
            Clause::Prefix(v.trim().to_lowercase())
        } else {
            let v = expr.strip_prefix('=').unwrap_or(expr);
            Clause::Equals(v.trim().to_lowercase())
        };
        clauses.push((field.to_string(), clause));
    }
    Ok(clauses)
}

fn clause_matches_scalar(clause: &Clause, value: &Value) -> bool {
    match clause {
        Clause::Range(lo, hi) => value.as_f64().is_some_and(|n| n >= *lo && n <= *hi),
        Clause::Cmp(op, rhs) => value.as_f64().is_some_and(|n| match op {
            CmpOp::Ge => n >= *rhs,
            CmpOp::Le => n <= *rhs,
            CmpOp::Gt => n > *rhs,
            CmpOp::Lt => n < *rhs,
        }),
        Clause::Prefix(prefix) => scalar_text(value)
            .to_lowercase()
            .split_whitespace()
            .any(|word| word.starts_with(prefix.as_str())),
        Clause::Equals(expected) => match value {
            Value::Number(n) => expected.parse::<f64>().ok() == n.as_f64(),
            other => scalar_text(other).to_lowercase() == *expected,
        },
    }
}

fn clause_matches(clause: &Clause, value: Option<&Value>) -> bool {
    match value {
        Some(Value::Array(items)) => items.iter().any(|v| clause_matches_scalar(clause, v)),
        Some(v) => clause_matches_scalar(clause, v),
        None => false,
    }
}

/// Highlight of `field` for the query words, or `None` if nothing matched.
fn highlight_field(field: &str, value: &Value, words: &[String]) -> Option<Highlight> {
    let contains = |text: &str| {
        let lower = text.to_lowercase();
        words.iter().any(|w| lower.contains(w.as_str()))
    };
    match value {
        Value::Array(items) => {
            let matched: Vec<String> = items
                .iter()
                .map(scalar_text)
                .filter(|t| contains(t))
                .collect();
            if matched.is_empty() {
                return None;
            }
            Some(Highlight {
                field: field.to_string(),
                snippet: None,
                snippets: Some(matched.clone()),
                matched_tokens: matched,
            })
        }
        other => {
            let text = scalar_text(other);
            if !contains(&text) {
                return None;
            }
            let mut snippet = String::new();
            let mut tokens = Vec::new();
            for word in words {
                for segment in mark_text(&text, word) {
                    if segment.matched && !tokens.contains(&segment.text) {
                        tokens.push(segment.text);
                    }
                }
            }
            let first = words.first().map(String::as_str).unwrap_or_default();
            for segment in mark_text(&text, first) {
                if segment.matched {
                    snippet.push_str(MARK_OPEN);
                    snippet.push_str(&segment.text);
                    snippet.push_str(MARK_CLOSE);
                } else {
                    snippet.push_str(&segment.text);
                }
            }
            Some(Highlight {
                field: field.to_string(),
                snippet: Some(snippet),
                snippets: None,
                matched_tokens: tokens,
            })
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a.and_then(Value::as_f64), b.and_then(Value::as_f64)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.map(scalar_text).cmp(&b.map(scalar_text)),
    }
}

fn run_search(stored: &StoredIndex, params: &SearchParameters) -> Result<SearchResponse, BackendError> {
    let query_by = params.query_by_fields();
    if query_by.is_empty() {
        return Err(bad_request(
            "Parameter `query_by` is required.".to_string(),
        ));
    }
    for field in &query_by {
        if stored.schema.field(field).is_none() {
            return Err(bad_request(format!(
                "Could not find a field named `{}` in the schema.",
                field
            )));
        }
    }
    let clauses = match params.filter_by.as_deref() {
        Some(f) if !f.trim().is_empty() => parse_filter(&stored.schema, f)?,
        _ => Vec::new(),
    };
    let words: Vec<String> = if params.q.trim() == MATCH_ALL {
        Vec::new()
    } else {
        params
            .q
            .split_whitespace()
            .map(str::to_lowercase)
            .collect()
    };

    let mut hits: Vec<Hit> = Vec::new();
    for doc in &stored.docs {
        if !clauses
            .iter()
            .all(|(field, clause)| clause_matches(clause, doc.get(field)))
        {
            continue;
        }
        let highlights: Vec<Highlight> = if words.is_empty() {
            Vec::new()
        } else {
            query_by
                .iter()
                .filter_map(|f| highlight_field(f, doc.get(*f)?, &words))
                .collect()
        };
        if !words.is_empty() && highlights.is_empty() {
            continue;
        }
        hits.push(Hit {
            document: doc.clone(),
            text_match: highlights.iter().map(|h| h.matched_tokens.len() as u64).sum(),
            highlights,
        });
    }

    match params.sort_by.as_deref().and_then(|s| s.split(',').next()) {
        Some(sort) if !sort.trim().is_empty() => {
            let (field, dir) = sort.trim().split_once(':').unwrap_or((sort.trim(), "asc"));
            if stored.schema.field(field).is_none() {
                return Err(bad_request(format!(
                    "Could not find a field named `{}` in the schema for sorting.",
                    field
                )));
            }
            hits.sort_by(|a, b| {
                let ord = compare_values(a.document.get(field), b.document.get(field));
                if dir.eq_ignore_ascii_case("desc") {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        _ => hits.sort_by(|a, b| b.text_match.cmp(&a.text_match)),
    }

    let found = hits.len() as u64;
    let per_page = params.per_page.max(1) as usize;
    let start = (params.page.max(1) as usize - 1) * per_page;
    let hits = hits.into_iter().skip(start).take(per_page).collect();

    Ok(SearchResponse {
        found,
        out_of: stored.docs.len() as u64,
        page: params.page,
        search_time_ms: 0,
        hits,
    })
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn health(&self) -> Result<bool, BackendError> {
        Ok(true)
    }

    async fn list_indexes(&self) -> Result<Vec<IndexSchema>, BackendError> {
        Ok(self
            .read_indexes()
            .values()
            .map(|s| s.schema.clone())
            .collect())
    }

    async fn get_index(&self, name: &str) -> Result<IndexSchema, BackendError> {
        self.read_indexes()
            .get(name)
            .map(|s| s.schema.clone())
            .ok_or_else(|| not_found(name))
    }

    async fn list_aliases(&self) -> Result<Vec<Alias>, BackendError> {
        Ok(self
            .aliases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn search(
        &self,
        index: &str,
        params: &SearchParameters,
    ) -> Result<SearchResponse, BackendError> {
        let indexes = self.read_indexes();
        let stored = indexes.get(index).ok_or_else(|| not_found(index))?;
        run_search(stored, params)
    }

    async fn upsert_document(
        &self,
        index: &str,
        document: &Document,
    ) -> Result<Document, BackendError> {
        let mut indexes = self.write_indexes();
        let stored = indexes.get_mut(index).ok_or_else(|| not_found(index))?;
        let existing = document.get("id").map(scalar_text).and_then(|id| {
            stored
                .docs
                .iter()
                .position(|d| d.get("id").map(scalar_text).as_deref() == Some(id.as_str()))
        });
        match existing {
            Some(pos) => stored.docs[pos] = document.clone(),
            None => stored.docs.push(document.clone()),
        }
        stored.schema.num_documents = stored.docs.len() as u64;
        Ok(document.clone())
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<Document, BackendError> {
        let mut indexes = self.write_indexes();
        let stored = indexes.get_mut(index).ok_or_else(|| not_found(index))?;
        let pos = stored
            .docs
            .iter()
            .position(|d| d.get("id").map(scalar_text).as_deref() == Some(id))
            .ok_or_else(|| BackendError::NotFound {
                message: format!("Could not find a document with id: {}", id),
            })?;
        let removed = stored.docs.remove(pos);
        stored.schema.num_documents = stored.docs.len() as u64;
        Ok(removed)
    }
}
