//! Error types for the query pipeline.
//!
//! [`BackendError`] is what a [`SearchBackend`](crate::backend::SearchBackend)
//! reports. [`SearchError`] is what the pipeline surfaces to the operator;
//! [`SearchError::classify`] maps one onto the other.

use thiserror::Error;

/// Failure reported by the remote search capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The addressed index or document does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// The API key was missing or rejected.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// The server rejected the request (bad filter syntax, unknown field, ...).
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Network failure or timeout before a response arrived.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The response body could not be decoded.
    #[error("invalid response: {message}")]
    Decode { message: String },
}

/// Local precondition failures. These never reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("not connected to a search server")]
    NotConnected,
    #[error("select an index to search")]
    NoIndexSelected,
    #[error("select at least one field to search in")]
    NoSearchFields,
}

/// Operator-facing error attached to the current results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The index (or the index an alias points to) no longer exists.
    #[error("index '{index}' could not be found: {message}")]
    Resolution { index: String, message: String },

    #[error("{message}")]
    Transport { message: String },
}

impl SearchError {
    /// Map a backend failure for a request against `index`.
    pub fn classify(index: &str, err: BackendError) -> Self {
        match err {
            BackendError::NotFound { message } => SearchError::Resolution {
                index: index.to_string(),
                message,
            },
            other => SearchError::Transport {
                message: other.to_string(),
            },
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SearchError::Validation(_))
    }
}

/// Rejected structured-filter edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unknown field '{field}'")]
    UnknownField { field: String },

    #[error("field '{field}' does not accept a {expected} constraint")]
    WrongFieldKind {
        field: String,
        expected: &'static str,
    },

    #[error("'{value}' is not a number (field '{field}')")]
    NotNumeric { field: String, value: String },
}
