//! Alias resolution.
//!
//! Maps operator-facing names to index names and back. All lookups are pure
//! functions over the latest fetched alias snapshot; unresolved names pass
//! through unchanged.

use crate::models::{Alias, IndexSchema};

/// Snapshot of the alias list, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    aliases: Vec<Alias>,
}

impl AliasTable {
    pub fn new(aliases: Vec<Alias>) -> Self {
        Self { aliases }
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// The target index of `name` if it is an alias, else `name` itself.
    ///
    /// A stale alias still resolves to its recorded target; the failure
    /// surfaces when the search itself comes back "not found".
    pub fn resolve_to_index<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.collection_name.as_str())
            .unwrap_or(name)
    }

    /// The first alias (in list order) targeting `index`, else `index`.
    pub fn display_name_for<'a>(&'a self, index: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|a| a.collection_name == index)
            .map(|a| a.name.as_str())
            .unwrap_or(index)
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.iter().any(|a| a.name == name)
    }

    /// Every alias targeting `index`, in list order.
    pub fn aliases_for(&self, index: &str) -> Vec<&Alias> {
        self.aliases
            .iter()
            .filter(|a| a.collection_name == index)
            .collect()
    }

    /// Aliases whose target is not among `indexes`.
    pub fn broken_aliases(&self, indexes: &[IndexSchema]) -> Vec<&Alias> {
        self.aliases
            .iter()
            .filter(|a| !indexes.iter().any(|i| i.name == a.collection_name))
            .collect()
    }
}
