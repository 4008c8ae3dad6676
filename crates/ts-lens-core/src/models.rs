//! Core data types shared by the query pipeline.
//!
//! Schema and alias types mirror what the remote index reports and are
//! treated as read-only snapshots. [`SearchRequest`] is the structured form
//! the pipeline works with; [`SearchParameters`] is its wire form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Query text that matches every document.
pub const MATCH_ALL: &str = "*";

/// A document as returned by the index: a JSON object.
pub type Document = Map<String, Value>;

/// One field of an index schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    /// Server type name, e.g. `"int32"`, `"string[]"`, `"string*"`.
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<bool>,
}

impl FieldSchema {
    pub fn new(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            facet: None,
            optional: None,
            index: None,
            sort: None,
        }
    }

    pub fn kind(&self) -> FieldKind {
        FieldKind::of(&self.field_type)
    }

    /// Array-typed fields cannot be sorted on.
    pub fn is_sortable(&self) -> bool {
        !self.field_type.contains("[]")
    }

    /// Fields are indexed unless the schema says otherwise.
    pub fn is_indexed(&self) -> bool {
        self.index.unwrap_or(true)
    }
}

/// Classification used by the structured filter widgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    String,
    Other,
}

impl FieldKind {
    pub fn of(field_type: &str) -> Self {
        match field_type {
            "int32" | "int64" | "float" => FieldKind::Numeric,
            "string" | "string[]" | "string*" => FieldKind::String,
            _ => FieldKind::Other,
        }
    }
}

/// Schema of one index (a Typesense collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sorting_field: Option<String>,
    #[serde(default)]
    pub num_documents: u64,
    /// Unix timestamp (seconds).
    #[serde(default)]
    pub created_at: i64,
}

impl IndexSchema {
    pub fn new(name: &str, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.to_string(),
            fields,
            default_sorting_field: None,
            num_documents: 0,
            created_at: 0,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Indexed string fields in declared order; the default `query_by`.
    pub fn default_query_by(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.kind() == FieldKind::String && f.is_indexed())
            .map(|f| f.name.clone())
            .collect()
    }
}

/// An alternate, stable name that resolves to an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    /// Target index name (wire name `collection_name`).
    pub collection_name: String,
}

impl Alias {
    pub fn new(name: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            collection_name: target.to_string(),
        }
    }
}

/// The structured search request the pipeline builds from operator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    /// Free-text query; empty means match-all.
    pub text: String,
    pub query_by: Vec<String>,
    pub filter: Option<String>,
    pub sort: Option<String>,
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
}

impl SearchRequest {
    pub fn new(query_by: Vec<String>, per_page: u32) -> Self {
        Self {
            text: String::new(),
            query_by,
            filter: None,
            sort: None,
            page: 1,
            per_page,
        }
    }
}

/// Wire form of a search request, as sent in the query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParameters {
    pub q: String,
    pub query_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl SearchParameters {
    /// Field names of `query_by`, in order.
    pub fn query_by_fields(&self) -> Vec<&str> {
        self.query_by
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect()
    }
}

/// `matched_tokens` arrives flat for scalar fields and nested per element
/// for array fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum MatchedTokens {
    Flat(Vec<String>),
    Nested(Vec<Vec<String>>),
}

fn flatten_tokens<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let tokens = Option::<MatchedTokens>::deserialize(deserializer)?;
    Ok(match tokens {
        None => Vec::new(),
        Some(MatchedTokens::Flat(v)) => v,
        Some(MatchedTokens::Nested(v)) => v.into_iter().flatten().collect(),
    })
}

/// Server-side highlight metadata for one field of a hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Per-element snippets for array fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippets: Option<Vec<String>>,
    #[serde(default, deserialize_with = "flatten_tokens")]
    pub matched_tokens: Vec<String>,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub document: Document,
    /// Relevance score.
    #[serde(default)]
    pub text_match: u64,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
}

impl Hit {
    pub fn highlight_for(&self, field: &str) -> Option<&Highlight> {
        self.highlights.iter().find(|h| h.field == field)
    }
}

/// A page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub found: u64,
    #[serde(default)]
    pub out_of: u64,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub search_time_ms: u64,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

fn first_page() -> u32 {
    1
}

/// Format a Unix timestamp as ISO 8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
