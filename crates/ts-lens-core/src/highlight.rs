//! Highlight reconciliation.
//!
//! Merges the server's highlight metadata with raw document values into a
//! render model. For each field of a hit:
//!
//! 1. a server snippet is rendered as-is (it already carries `<mark>` tags);
//! 2. otherwise, for a list value, the elements that case-insensitively
//!    contain a matched token are marked; every element is kept, in order;
//! 3. otherwise, for a scalar with matched tokens, the tokens themselves
//!    are shown comma-joined;
//! 4. otherwise only the raw value is shown.
//!
//! [`mark_text`] is the client-side fallback used when there is no server
//! metadata at all: purely textual, case-insensitive matching of the query.

use serde::Serialize;
use serde_json::Value;

use crate::models::{Document, Hit, IndexSchema};

/// Opening tag the server wraps matches in.
pub const MARK_OPEN: &str = "<mark>";
/// Closing tag the server wraps matches in.
pub const MARK_CLOSE: &str = "</mark>";

/// A run of text, matched or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    pub matched: bool,
}

/// One element of a list-valued field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    pub text: String,
    pub matched: bool,
}

/// How a field's highlight is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRender {
    /// Server snippet containing `<mark>` tags.
    Snippet { snippet: String },
    /// List value with per-element match flags.
    List { items: Vec<ListItem> },
    /// Matched tokens of a scalar field, comma-joined.
    Tokens { line: String },
    /// Client-side marked text.
    Marked { segments: Vec<Segment> },
    /// No highlight; raw value only.
    Plain,
}

/// A field ready to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedField {
    pub name: String,
    /// The raw value as text.
    pub value: String,
    pub render: FieldRender,
}

impl RenderedField {
    /// Single-line text with matches wrapped in `open`/`close`.
    pub fn display(&self, open: &str, close: &str) -> String {
        match &self.render {
            FieldRender::Snippet { snippet } => replace_marks(snippet, open, close),
            FieldRender::List { items } => items
                .iter()
                .map(|item| wrap(&item.text, item.matched, open, close))
                .collect::<Vec<_>>()
                .join(", "),
            FieldRender::Tokens { line } => format!("{}  [{}{}{}]", self.value, open, line, close),
            FieldRender::Marked { segments } => segments
                .iter()
                .map(|s| wrap(&s.text, s.matched, open, close))
                .collect(),
            FieldRender::Plain => self.value.clone(),
        }
    }

    pub fn is_highlighted(&self) -> bool {
        !matches!(self.render, FieldRender::Plain)
    }
}

/// A hit ready to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedHit {
    pub score: u64,
    pub fields: Vec<RenderedField>,
}

impl RenderedHit {
    pub fn field(&self, name: &str) -> Option<&RenderedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn wrap(text: &str, matched: bool, open: &str, close: &str) -> String {
    if matched {
        format!("{}{}{}", open, text, close)
    } else {
        text.to_string()
    }
}

/// Swap the server's `<mark>` tags for other markers.
pub fn replace_marks(snippet: &str, open: &str, close: &str) -> String {
    snippet.replace(MARK_OPEN, open).replace(MARK_CLOSE, close)
}

/// Text of a scalar JSON value; strings are unquoted.
fn element_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Text of any JSON value; lists are comma-joined.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().map(element_text).collect::<Vec<_>>().join(", "),
        other => element_text(other),
    }
}

/// Field names in render order: schema-declared fields present in the
/// document, then the rest in key order.
fn field_order<'a>(document: &'a Document, schema: Option<&'a IndexSchema>) -> Vec<&'a str> {
    let mut names: Vec<&str> = schema
        .map(|s| {
            s.fields
                .iter()
                .map(|f| f.name.as_str())
                .filter(|n| document.contains_key(*n))
                .collect()
        })
        .unwrap_or_default();
    for key in document.keys() {
        if !names.contains(&key.as_str()) {
            names.push(key);
        }
    }
    names
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && find_ci(haystack, needle, 0).is_some()
}

fn chars_eq_ci(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Byte range of the first case-insensitive occurrence of `needle` in
/// `haystack` at or after byte offset `from`.
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<(usize, usize)> {
    let rest = haystack.get(from..)?;
    for (start, _) in rest.char_indices() {
        let mut hay = rest[start..].char_indices();
        let mut end = None;
        let mut ok = true;
        for n in needle.chars() {
            match hay.next() {
                Some((i, h)) if chars_eq_ci(h, n) => end = Some(start + i + h.len_utf8()),
                _ => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            if let Some(end) = end {
                return Some((from + start, from + end));
            }
        }
    }
    None
}

/// Client-side fallback: split `text` into segments, marking every
/// case-insensitive occurrence of `query`. Non-matching text is untouched.
pub fn mark_text(text: &str, query: &str) -> Vec<Segment> {
    let query = query.trim();
    if query.is_empty() || text.is_empty() {
        return vec![Segment {
            text: text.to_string(),
            matched: false,
        }];
    }
    let mut segments = Vec::new();
    let mut pos = 0;
    while let Some((start, end)) = find_ci(text, query, pos) {
        if start > pos {
            segments.push(Segment {
                text: text[pos..start].to_string(),
                matched: false,
            });
        }
        segments.push(Segment {
            text: text[start..end].to_string(),
            matched: true,
        });
        pos = end;
    }
    if pos < text.len() {
        segments.push(Segment {
            text: text[pos..].to_string(),
            matched: false,
        });
    }
    segments
}

fn reconcile_field(hit: &Hit, name: &str, value: &Value) -> FieldRender {
    let highlight = hit.highlight_for(name);
    if let Some(snippet) = highlight.and_then(|h| h.snippet.as_ref()) {
        return FieldRender::Snippet {
            snippet: snippet.clone(),
        };
    }
    let tokens: &[String] = highlight.map(|h| h.matched_tokens.as_slice()).unwrap_or(&[]);
    if tokens.is_empty() {
        return FieldRender::Plain;
    }
    match value {
        Value::Array(elements) => {
            let items: Vec<ListItem> = elements
                .iter()
                .map(|e| {
                    let text = element_text(e);
                    let matched = tokens.iter().any(|t| contains_ci(&text, t));
                    ListItem { text, matched }
                })
                .collect();
            if items.iter().any(|i| i.matched) {
                FieldRender::List { items }
            } else {
                FieldRender::Plain
            }
        }
        _ => FieldRender::Tokens {
            line: tokens.join(", "),
        },
    }
}

/// Build the render model of one hit using server highlight metadata.
pub fn reconcile(hit: &Hit, schema: Option<&IndexSchema>) -> RenderedHit {
    let fields = field_order(&hit.document, schema)
        .into_iter()
        .filter_map(|name| {
            let value = hit.document.get(name)?;
            Some(RenderedField {
                name: name.to_string(),
                value: value_text(value),
                render: reconcile_field(hit, name, value),
            })
        })
        .collect();
    RenderedHit {
        score: hit.text_match,
        fields,
    }
}

/// Build the render model of a plain document, marking `query` client-side.
pub fn mark_document(
    document: &Document,
    schema: Option<&IndexSchema>,
    query: &str,
) -> Vec<RenderedField> {
    let query = query.trim();
    field_order(document, schema)
        .into_iter()
        .filter_map(|name| {
            let value = document.get(name)?;
            let text = value_text(value);
            let render = match value {
                Value::Array(elements) => {
                    let items: Vec<ListItem> = elements
                        .iter()
                        .map(|e| {
                            let text = element_text(e);
                            let matched = contains_ci(&text, query);
                            ListItem { text, matched }
                        })
                        .collect();
                    if items.iter().any(|i| i.matched) {
                        FieldRender::List { items }
                    } else {
                        FieldRender::Plain
                    }
                }
                Value::Object(_) => FieldRender::Plain,
                _ => {
                    let segments = mark_text(&text, query);
                    if segments.iter().any(|s| s.matched) {
                        FieldRender::Marked { segments }
                    } else {
                        FieldRender::Plain
                    }
                }
            };
            Some(RenderedField {
                name: name.to_string(),
                value: text,
                render,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldSchema, Highlight};
    use serde_json::json;

    fn hit(document: Value, highlights: Vec<Highlight>) -> Hit {
        Hit {
            document: document.as_object().cloned().unwrap(),
            text_match: 42,
            highlights,
        }
    }

    fn tokens(field: &str, tokens: &[&str]) -> Highlight {
        Highlight {
            field: field.into(),
            snippet: None,
            snippets: None,
            matched_tokens: tokens.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn marks_only_matching_list_elements_in_order() {
        let h = hit(json!({"tags": ["red", "blue"]}), vec![tokens("tags", &["blue"])]);
        let rendered = reconcile(&h, None);
        assert_eq!(
            rendered.field("tags").unwrap().render,
            FieldRender::List {
                items: vec![
                    ListItem { text: "red".into(), matched: false },
                    ListItem { text: "blue".into(), matched: true },
                ]
            }
        );
    }

    #[test]
    fn list_matching_is_case_insensitive_substring() {
        let h = hit(
            json!({"tags": ["Dark Blue", "green", "BLUEISH"]}),
            vec![tokens("tags", &["blue"])],
        );
        let field = reconcile(&h, None).fields.remove(0);
        assert_eq!(field.display("[", "]"), "[Dark Blue], green, [BLUEISH]");
    }

    #[test]
    fn server_snippet_wins() {
        let mut hl = tokens("title", &["Red"]);
        hl.snippet = Some("<mark>Red</mark> running shoe".into());
        let h = hit(json!({"title": "Red running shoe"}), vec![hl]);
        let field = reconcile(&h, None).fields.remove(0);
        assert_eq!(field.display("**", "**"), "**Red** running shoe");
        assert_eq!(field.value, "Red running shoe");
    }

    #[test]
    fn scalar_without_snippet_shows_tokens() {
        let h = hit(json!({"sku": "AB-123"}), vec![tokens("sku", &["AB", "123"])]);
        let field = reconcile(&h, None).fields.remove(0);
        assert_eq!(field.render, FieldRender::Tokens { line: "AB, 123".into() });
    }

    #[test]
    fn unmatched_fields_are_plain() {
        let h = hit(
            json!({"title": "Shoe", "price": 12.5, "tags": ["x"]}),
            vec![tokens("tags", &["nomatch"])],
        );
        let rendered = reconcile(&h, None);
        assert!(rendered.fields.iter().all(|f| !f.is_highlighted()));
        assert_eq!(rendered.field("price").unwrap().value, "12.5");
    }

    #[test]
    fn schema_fields_come_first() {
        let schema = IndexSchema::new(
            "products",
            vec![FieldSchema::new("title", "string"), FieldSchema::new("brand", "string")],
        );
        let h = hit(json!({"id": "7", "brand": "Acme", "title": "Anvil"}), vec![]);
        let names: Vec<String> = reconcile(&h, Some(&schema))
            .fields
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["title", "brand", "id"]);
    }

    #[test]
    fn mark_text_wraps_every_occurrence() {
        let segments = mark_text("Jacket and JACKETS", "jacket");
        let marked: String = segments
            .iter()
            .map(|s| wrap(&s.text, s.matched, "<", ">"))
            .collect();
        assert_eq!(marked, "<Jacket> and <JACKET>S");
    }

    #[test]
    fn mark_text_leaves_text_alone_without_match() {
        assert_eq!(
            mark_text("plain", "zzz"),
            vec![Segment { text: "plain".into(), matched: false }]
        );
        assert_eq!(mark_text("plain", "").len(), 1);
    }

    #[test]
    fn mark_text_handles_multibyte() {
        let segments = mark_text("Ünïcode ÜNÏ", "ünï");
        assert_eq!(segments.iter().filter(|s| s.matched).count(), 2);
        assert_eq!(segments[0].text, "Ünï");
    }

    #[test]
    fn mark_document_marks_values_client_side() {
        let doc = json!({"name": "Marc Jacobs", "tags": ["marc", "bag"], "meta": {"a": 1}});
        let fields = mark_document(doc.as_object().unwrap(), None, "marc");
        let name = fields.iter().find(|f| f.name == "name").unwrap();
        assert_eq!(name.display("[", "]"), "[Marc] Jacobs");
        let tags = fields.iter().find(|f| f.name == "tags").unwrap();
        assert_eq!(tags.display("[", "]"), "[marc], bag");
        let meta = fields.iter().find(|f| f.name == "meta").unwrap();
        assert_eq!(meta.value, r#"{"a":1}"#);
    }
}
