//! Terminal rendering of search results.
//!
//! Hits are printed field by field, schema fields first. Matches are
//! wrapped in `**` on stdout. Diagnostics go to stderr so stdout stays
//! parseable.

use ts_lens_core::highlight::{mark_document, reconcile, RenderedField};
use ts_lens_core::models::{format_ts_iso, Hit, IndexSchema, MATCH_ALL};
use ts_lens_core::pagination::Pagination;

use crate::session::CurrentResults;

const OPEN: &str = "**";
const CLOSE: &str = "**";

/// Fields of one hit. Hits without any server highlight metadata are
/// marked client-side against `text`.
pub fn hit_fields(hit: &Hit, schema: Option<&IndexSchema>, text: &str) -> Vec<RenderedField> {
    let text = text.trim();
    if hit.highlights.is_empty() && !text.is_empty() && text != MATCH_ALL {
        mark_document(&hit.document, schema, text)
    } else {
        reconcile(hit, schema).fields
    }
}

pub fn render_hit(position: u64, hit: &Hit, schema: Option<&IndexSchema>, text: &str) -> String {
    let mut out = format!("{}. [{}]\n", position, hit.text_match);
    for field in hit_fields(hit, schema, text) {
        out.push_str(&format!(
            "    {}: {}\n",
            field.name,
            field.display(OPEN, CLOSE).replace('\n', " ")
        ));
    }
    out
}

/// "Showing {from} to {to} of {found}" plus the page position.
pub fn footer(pagination: &Pagination) -> String {
    match pagination.showing() {
        Some((from, to)) => format!(
            "Showing {} to {} of {} (page {} of {})",
            format_number(from),
            format_number(to),
            format_number(pagination.found),
            pagination.page,
            pagination.total_pages()
        ),
        None if pagination.found > 0 => format!(
            "Page {} is past the last page ({}) of {} results.",
            pagination.page,
            pagination.total_pages(),
            format_number(pagination.found)
        ),
        None => "No results.".to_string(),
    }
}

pub fn print_results(results: &CurrentResults, schema: Option<&IndexSchema>) {
    if let Some(err) = &results.error {
        eprintln!("Error: {}", err);
    }
    let first = u64::from(results.page.saturating_sub(1)) * u64::from(results.per_page) + 1;
    for (i, hit) in results.hits.iter().enumerate() {
        println!("{}", render_hit(first + i as u64, hit, schema, &results.text));
    }
    println!("{}", footer(&results.pagination()));
}

/// One line per index for `tsl indexes`.
pub fn index_row(display: &str, schema: &IndexSchema) -> String {
    let created = if schema.created_at > 0 {
        format_ts_iso(schema.created_at)
    } else {
        "-".to_string()
    };
    let name = if display == schema.name {
        schema.name.clone()
    } else {
        format!("{} ({})", display, schema.name)
    };
    format!(
        "{:<32} {:>12} {:>8}  {}",
        name,
        format_number(schema.num_documents),
        schema.fields.len(),
        created
    )
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
