//! Query execution.
//!
//! Turns a [`SearchRequest`] into wire [`SearchParameters`] and runs it
//! against a [`SearchBackend`]. Precondition failures are reported as
//! [`ValidationError`]s before anything is sent; backend failures are
//! classified into [`SearchError`].
//!
//! Stale-response handling is the caller's job: tag each call with a
//! [`QueryGeneration`](crate::generation::QueryGeneration) and drop results
//! that are no longer the latest.
//!
//! # Parameter mapping
//!
//! | Request | Wire | Rule |
//! |---------|------|------|
//! | `text` | `q` | `"*"` when empty |
//! | `query_by` | `query_by` | comma-joined |
//! | `filter` | `filter_by` | omitted when absent or blank |
//! | `sort` | `sort_by` | omitted when absent or blank |
//! | `page`, `per_page` | same | page is at least 1 |

use crate::backend::SearchBackend;
use crate::error::{SearchError, ValidationError};
use crate::filter::non_empty;
use crate::models::{SearchParameters, SearchRequest, SearchResponse, MATCH_ALL};

/// Check that `req` may be sent to `index`.
pub fn validate(index: Option<&str>, req: &SearchRequest) -> Result<(), ValidationError> {
    match index {
        Some(name) if !name.trim().is_empty() => {}
        _ => return Err(ValidationError::NoIndexSelected),
    }
    if req.query_by.iter().all(|f| f.trim().is_empty()) {
        return Err(ValidationError::NoSearchFields);
    }
    Ok(())
}

/// Wire parameters for `req`.
pub fn build_params(req: &SearchRequest) -> SearchParameters {
    let q = match req.text.trim() {
        "" => MATCH_ALL.to_string(),
        text => text.to_string(),
    };
    let query_by = req
        .query_by
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    SearchParameters {
        q,
        query_by,
        filter_by: req.filter.as_deref().and_then(non_empty),
        sort_by: req.sort.as_deref().and_then(non_empty),
        page: req.page.max(1),
        per_page: req.per_page,
    }
}

/// Validate `req` and run it against the already-resolved `index`.
pub async fn execute<B: SearchBackend + ?Sized>(
    backend: &B,
    index: Option<&str>,
    req: &SearchRequest,
) -> Result<SearchResponse, SearchError> {
    validate(index, req)?;
    let index = index.unwrap_or_default();
    let params = build_params(req);
    backend
        .search(index, &params)
        .await
        .map_err(|e| SearchError::classify(index, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use crate::error::BackendError;
    use crate::models::{FieldSchema, IndexSchema};
    use serde_json::json;

    fn request() -> SearchRequest {
        SearchRequest::new(vec!["title".into(), "tags".into()], 25)
    }

    fn backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.add_index(IndexSchema::new(
            "books_v2",
            vec![
                FieldSchema::new("title", "string"),
                FieldSchema::new("tags", "string[]"),
                FieldSchema::new("year", "int32"),
            ],
        ));
        backend.add_documents(
            "books_v2",
            vec![
                json!({"id": "1", "title": "Dune", "tags": ["scifi"], "year": 1965}),
                json!({"id": "2", "title": "Emma", "tags": ["classic"], "year": 1815}),
            ],
        );
        backend
    }

    #[test]
    fn empty_text_becomes_match_all() {
        let mut req = request();
        req.filter = Some("   ".into());
        let params = build_params(&req);
        assert_eq!(params.q, "*");
        assert_eq!(params.query_by, "title,tags");
        assert_eq!(params.filter_by, None);
        assert_eq!(params.sort_by, None);
        assert_eq!(params.page, 1);
    }

    #[test]
    fn filter_and_sort_are_passed_through() {
        let mut req = request();
        req.text = " dune ".into();
        req.filter = Some("year:[1900..2000]".into());
        req.sort = Some("year:desc".into());
        req.page = 3;
        let params = build_params(&req);
        assert_eq!(params.q, "dune");
        assert_eq!(params.filter_by.as_deref(), Some("year:[1900..2000]"));
        assert_eq!(params.sort_by.as_deref(), Some("year:desc"));
        assert_eq!(params.page, 3);
    }

    #[test]
    fn validation_needs_index_and_fields() {
        assert_eq!(
            validate(None, &request()),
            Err(ValidationError::NoIndexSelected)
        );
        let mut req = request();
        req.query_by.clear();
        assert_eq!(
            validate(Some("books_v2"), &req),
            Err(ValidationError::NoSearchFields)
        );
        assert!(validate(Some("books_v2"), &request()).is_ok());
    }

    #[tokio::test]
    async fn validation_failure_never_reaches_backend() {
        let backend = backend();
        let mut req = request();
        req.query_by = vec![" ".into()];
        let err = execute(&backend, Some("books_v2"), &req).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn runs_search() {
        let backend = backend();
        let mut req = request();
        req.filter = Some("year:>=1900".into());
        let resp = execute(&backend, Some("books_v2"), &req).await.unwrap();
        assert_eq!(resp.found, 1);
        assert_eq!(resp.hits[0].document["title"], "Dune");
    }

    #[tokio::test]
    async fn missing_index_is_resolution_error() {
        let backend = backend();
        backend.drop_index("books_v2");
        let err = execute(&backend, Some("books_v2"), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Resolution { ref index, .. } if index == "books_v2"));
    }

    #[tokio::test]
    async fn rejected_filter_is_transport_error() {
        let backend = backend();
        let mut req = request();
        req.filter = Some("nope".into());
        let err = execute(&backend, Some("books_v2"), &req).await.unwrap_err();
        let expected = SearchError::classify(
            "books_v2",
            BackendError::Rejected {
                status: 400,
                message: "Could not parse the filter query.".into(),
            },
        );
        assert_eq!(err, expected);
    }
}
