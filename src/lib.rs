//! # ts-lens
//!
//! A search client for Typesense-compatible servers: alias-aware index
//! selection, structured and raw filters, debounced live querying and
//! highlighted result pages.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌───────────────┐   ┌──────────────────┐
//! │  CLI (tsl)    │──▶│   Session     │──▶│  SearchBackend   │
//! │ search/browse │   │ debounce+gens │   │ Typesense (HTTP) │
//! └───────────────┘   └──────┬────────┘   └──────────────────┘
//!                            │ uses
//!                            ▼
//!                     ┌──────────────┐
//!                     │ ts-lens-core │  aliases, filters, paging,
//!                     └──────────────┘  highlights, execute
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export TYPESENSE_API_KEY=xyz
//! tsl health
//! tsl indexes
//! tsl search products -q shirt --range price=10..50
//! tsl browse products
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`client`] | Typesense HTTP client |
//! | [`debounce`] | Cancellable debounce timers |
//! | [`session`] | The reactive search session |
//! | [`render`] | Terminal rendering of hits |
//! | [`catalog`] | Index and alias listings |
//! | [`search`] | One-shot search |
//! | [`browse`] | Interactive line-driven browsing |

pub mod browse;
pub mod catalog;
pub mod client;
pub mod config;
pub mod debounce;
pub mod render;
pub mod search;
pub mod session;
