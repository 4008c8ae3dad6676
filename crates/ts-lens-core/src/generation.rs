//! Query generations.
//!
//! Every dispatched request gets a fresh [`QueryGeneration`] from the
//! [`GenerationTracker`]. When a response (or failure) arrives, it is only
//! applied if its generation is still the latest one minted; anything older
//! is stale and dropped. Stale responses are never errors.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Recency token of one dispatched request. Larger is newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct QueryGeneration(u64);

impl QueryGeneration {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Mints generations and remembers the latest one.
#[derive(Debug, Default)]
pub struct GenerationTracker {
    latest: AtomicU64,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self {
            latest: AtomicU64::new(0),
        }
    }

    /// Mint a new generation. It becomes the latest, superseding all
    /// earlier ones.
    pub fn next(&self) -> QueryGeneration {
        QueryGeneration(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The most recently minted generation, if any.
    pub fn latest(&self) -> Option<QueryGeneration> {
        match self.latest.load(Ordering::SeqCst) {
            0 => None,
            n => Some(QueryGeneration(n)),
        }
    }

    pub fn is_latest(&self, generation: QueryGeneration) -> bool {
        self.latest.load(Ordering::SeqCst) == generation.0
    }
}
