//! The remote search capability.
//!
//! The [`SearchBackend`] trait is everything the query pipeline needs from
//! the remote index: schema and alias listings, search, and the single
//! document mutations whose success invalidates the current results.
//!
//! Implementations must be `Send + Sync` to work with async runtimes. The
//! HTTP implementation lives in the `ts-lens` crate; [`memory`] provides an
//! in-process one for tests.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`health`](SearchBackend::health) | Liveness of the server |
//! | [`list_indexes`](SearchBackend::list_indexes) | All index schemas |
//! | [`get_index`](SearchBackend::get_index) | One index schema |
//! | [`list_aliases`](SearchBackend::list_aliases) | All aliases |
//! | [`search`](SearchBackend::search) | Run one search request |
//! | [`upsert_document`](SearchBackend::upsert_document) | Create or replace a document |
//! | [`delete_document`](SearchBackend::delete_document) | Delete a document by id |

pub mod memory;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::models::{Alias, Document, IndexSchema, SearchParameters, SearchResponse};

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// `true` when the server reports itself healthy.
    async fn health(&self) -> Result<bool, BackendError>;

    async fn list_indexes(&self) -> Result<Vec<IndexSchema>, BackendError>;

    async fn get_index(&self, name: &str) -> Result<IndexSchema, BackendError>;

    async fn list_aliases(&self) -> Result<Vec<Alias>, BackendError>;

    /// Search the index named `index` (already alias-resolved).
    async fn search(
        &self,
        index: &str,
        params: &SearchParameters,
    ) -> Result<SearchResponse, BackendError>;

    /// Create or replace a document; returns the stored document.
    async fn upsert_document(
        &self,
        index: &str,
        document: &Document,
    ) -> Result<Document, BackendError>;

    /// Delete a document by id; returns the deleted document.
    async fn delete_document(&self, index: &str, id: &str) -> Result<Document, BackendError>;
}
