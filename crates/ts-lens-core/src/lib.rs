//! # ts-lens core
//!
//! Runtime-free logic for composing and executing queries against a
//! Typesense-style document index: the data model, alias resolution, filter
//! compilation, pagination, highlight reconciliation, generation tokens, and
//! the [`backend::SearchBackend`] trait.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. Timers,
//! transports and the reactive session live in the `ts-lens` crate.

pub mod alias;
pub mod backend;
pub mod error;
pub mod execute;
pub mod filter;
pub mod generation;
pub mod highlight;
pub mod models;
pub mod pagination;
