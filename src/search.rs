//! One-shot search (`tsl search`).
//!
//! Builds a single [`SearchRequest`] from command-line arguments, runs it
//! through the same resolve, compile and execute path the interactive
//! session uses, and prints the page.
//!
//! # Filters
//!
//! Structured constraints are given per field and compiled against the
//! index schema:
//!
//! ```bash
//! tsl search books -q river --range year=1990..2000 --prefix author=Mar
//! tsl search books --range year=2000..      # open upper bound
//! ```
//!
//! `--filter` passes a raw `filter_by` expression instead and cannot be
//! combined with `--range` or `--prefix`.

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;

use crate::config::Settings;
use crate::render::{footer, render_hit};
use ts_lens_core::alias::AliasTable;
use ts_lens_core::backend::SearchBackend;
use ts_lens_core::error::SearchError;
use ts_lens_core::execute::execute;
use ts_lens_core::filter::{non_empty, FieldCatalog, StructuredDraft};
use ts_lens_core::models::{IndexSchema, SearchRequest, SearchResponse};
use ts_lens_core::pagination::Pagination;

#[derive(Debug, Clone, Default, Args)]
pub struct SearchArgs {
    /// Index or alias to search.
    pub index: String,

    /// Free-text query. Omit to list every document.
    #[arg(short, long, default_value = "")]
    pub query: String,

    /// Comma-separated fields to search. Defaults to the index's string fields.
    #[arg(long)]
    pub query_by: Option<String>,

    /// Numeric range `field=min..max`; either bound may be empty.
    #[arg(long = "range", value_name = "FIELD=MIN..MAX", conflicts_with = "filter")]
    pub ranges: Vec<String>,

    /// String prefix `field=value`.
    #[arg(long = "prefix", value_name = "FIELD=VALUE", conflicts_with = "filter")]
    pub prefixes: Vec<String>,

    /// Raw `filter_by` expression.
    #[arg(long)]
    pub filter: Option<String>,

    /// Sort expression, e.g. `year:desc`.
    #[arg(long)]
    pub sort: Option<String>,

    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Hits per page. Defaults to `default_page_size` from the config.
    #[arg(long)]
    pub per_page: Option<u32>,

    /// Print the raw response as JSON.
    #[arg(long)]
    pub json: bool,
}

pub(crate) fn split_assignment<'a>(flag: &str, raw: &'a str) -> Result<(&'a str, &'a str)> {
    raw.split_once('=')
        .map(|(field, value)| (field.trim(), value))
        .filter(|(field, _)| !field.is_empty())
        .ok_or_else(|| anyhow!("invalid --{} '{}': expected FIELD=VALUE", flag, raw))
}

pub(crate) fn parse_range(raw: &str) -> Result<(&str, &str, &str)> {
    let (field, bounds) = split_assignment("range", raw)?;
    let (min, max) = bounds
        .split_once("..")
        .ok_or_else(|| anyhow!("invalid --range '{}': expected FIELD=MIN..MAX", raw))?;
    Ok((field, min, max))
}

/// Compile `--range`/`--prefix` (or take `--filter` verbatim) for `schema`.
pub fn compile_filter(args: &SearchArgs, schema: &IndexSchema) -> Result<Option<String>> {
    if let Some(raw) = &args.filter {
        if !args.ranges.is_empty() || !args.prefixes.is_empty() {
            bail!("--filter cannot be combined with --range or --prefix");
        }
        return Ok(non_empty(raw));
    }
    let catalog = FieldCatalog::from_schema(schema);
    let mut draft = StructuredDraft::default();
    for raw in &args.ranges {
        let (field, min, max) = parse_range(raw)?;
        draft.set_numeric_range(&catalog, field, min, max)?;
    }
    for raw in &args.prefixes {
        let (field, value) = split_assignment("prefix", raw)?;
        draft.set_string_prefix(&catalog, field, value)?;
    }
    Ok(non_empty(&draft.compile(&catalog)))
}

/// Resolve the index, build the request and execute it.
pub async fn search(
    backend: &dyn SearchBackend,
    settings: &Settings,
    args: &SearchArgs,
) -> Result<(IndexSchema, SearchRequest, SearchResponse)> {
    let aliases = AliasTable::new(
        backend
            .list_aliases()
            .await
            .context("Failed to list aliases")?,
    );
    let index = aliases.resolve_to_index(&args.index).to_string();
    tracing::debug!(selected = %args.index, index = %index, "resolved index");

    let schema = backend
        .get_index(&index)
        .await
        .map_err(|e| SearchError::classify(&index, e))?;

    let query_by = match &args.query_by {
        Some(fields) => fields
            .split(',')
            .filter_map(non_empty)
            .collect::<Vec<_>>(),
        None => schema.default_query_by(),
    };
    let per_page = args.per_page.unwrap_or(settings.default_page_size);
    if per_page == 0 {
        bail!("--per-page must be > 0");
    }

    let mut request = SearchRequest::new(query_by, per_page);
    request.text = args.query.trim().to_string();
    request.filter = compile_filter(args, &schema)?;
    request.sort = args.sort.as_deref().and_then(non_empty);
    request.page = args.page.max(1);

    let response = execute(backend, Some(&index), &request).await?;
    tracing::debug!(
        found = response.found,
        elapsed_ms = response.search_time_ms,
        "search finished"
    );
    Ok((schema, request, response))
}

pub async fn run_search(
    backend: &dyn SearchBackend,
    settings: &Settings,
    args: &SearchArgs,
) -> Result<()> {
    let (schema, request, response) = search(backend, settings, args).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let first = u64::from(request.page - 1) * u64::from(request.per_page) + 1;
    for (i, hit) in response.hits.iter().enumerate() {
        println!(
            "{}",
            render_hit(first + i as u64, hit, Some(&schema), &request.text)
        );
    }
    let pagination = Pagination::new(request.page, request.per_page, response.found);
    println!("{}", footer(&pagination));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ts_lens_core::backend::memory::InMemoryBackend;
    use ts_lens_core::models::{Alias, FieldSchema};

    fn backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.add_index(IndexSchema::new(
            "books_v1",
            vec![
                FieldSchema::new("title", "string"),
                FieldSchema::new("author", "string"),
                FieldSchema::new("year", "int32"),
            ],
        ));
        backend.add_documents(
            "books_v1",
            (0..30).map(|i| {
                json!({
                    "id": i.to_string(),
                    "title": format!("Book {}", i),
                    "author": if i % 3 == 0 { "Marc Levy" } else { "Anne Rice" },
                    "year": 1980 + i,
                })
            }),
        );
        backend.set_alias(Alias::new("books", "books_v1"));
        backend
    }

    fn args(index: &str) -> SearchArgs {
        SearchArgs {
            index: index.to_string(),
            page: 1,
            ..SearchArgs::default()
        }
    }

    #[test]
    fn parses_ranges() {
        assert_eq!(parse_range("year=1990..2000").unwrap(), ("year", "1990", "2000"));
        assert_eq!(parse_range(" year =..5").unwrap(), ("year", "", "5"));
        assert!(parse_range("year=1990").is_err());
        assert!(parse_range("=1..2").is_err());
    }

    #[tokio::test]
    async fn resolves_alias_and_defaults() {
        let (schema, request, response) = search(&backend(), &Settings::default(), &args("books"))
            .await
            .unwrap();
        assert_eq!(schema.name, "books_v1");
        assert_eq!(request.query_by, vec!["title", "author"]);
        assert_eq!(request.per_page, 25);
        assert_eq!(response.found, 30);
        assert_eq!(response.hits.len(), 25);
    }

    #[tokio::test]
    async fn structured_flags_compile() {
        let mut a = args("books");
        a.ranges = vec!["year=1990..".into()];
        a.prefixes = vec!["author=Marc".into()];
        a.sort = Some("year:desc".into());
        let (_, request, response) = search(&backend(), &Settings::default(), &a)
            .await
            .unwrap();
        assert_eq!(
            request.filter.as_deref(),
            Some("year:>=1990 && author:Marc*")
        );
        assert_eq!(response.found, 6);
        assert_eq!(response.hits[0].document["year"], json!(2007));
    }

    #[tokio::test]
    async fn raw_filter_and_page() {
        let mut a = args("books_v1");
        a.filter = Some("year:<1985".into());
        a.per_page = Some(2);
        a.page = 3;
        let (_, request, response) = search(&backend(), &Settings::default(), &a)
            .await
            .unwrap();
        assert_eq!(request.filter.as_deref(), Some("year:<1985"));
        assert_eq!(response.found, 5);
        assert_eq!(response.hits.len(), 1);
    }

    #[tokio::test]
    async fn bad_inputs_fail() {
        let settings = Settings::default();
        let mut wrong_kind = args("books");
        wrong_kind.prefixes = vec!["year=19".into()];
        assert!(search(&backend(), &settings, &wrong_kind).await.is_err());

        let mut mixed = args("books");
        mixed.filter = Some("year:>1".into());
        mixed.ranges = vec!["year=1..2".into()];
        assert!(search(&backend(), &settings, &mixed).await.is_err());

        let err = search(&backend(), &settings, &args("missing"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SearchError>(),
            Some(SearchError::Resolution { .. })
        ));
    }
}
