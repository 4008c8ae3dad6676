//! Catalog commands: `tsl health`, `tsl indexes`, `tsl aliases` and
//! `tsl resolve`.
//!
//! Each command works against any [`SearchBackend`] and prints to stdout.
//! The listings are built by pure functions so they can be checked without
//! a terminal.

use anyhow::{bail, Context, Result};

use crate::render::index_row;
use ts_lens_core::alias::AliasTable;
use ts_lens_core::backend::SearchBackend;
use ts_lens_core::models::{Alias, IndexSchema};

pub async fn run_health(backend: &dyn SearchBackend, node: &str) -> Result<()> {
    let ok = backend
        .health()
        .await
        .with_context(|| format!("Failed to reach {}", node))?;
    if !ok {
        bail!("{} reports unhealthy", node);
    }
    println!("{}: ok", node);
    Ok(())
}

/// Load indexes and aliases together; every listing needs both.
async fn load(backend: &dyn SearchBackend) -> Result<(Vec<IndexSchema>, AliasTable)> {
    let mut indexes = backend
        .list_indexes()
        .await
        .context("Failed to list indexes")?;
    let aliases = backend
        .list_aliases()
        .await
        .context("Failed to list aliases")?;
    indexes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok((indexes, AliasTable::new(aliases)))
}

pub fn index_listing(indexes: &[IndexSchema], aliases: &AliasTable) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<32} {:>12} {:>8}  {}",
        "INDEX", "DOCUMENTS", "FIELDS", "CREATED"
    )];
    for schema in indexes {
        lines.push(index_row(aliases.display_name_for(&schema.name), schema));
    }
    lines
}

pub fn alias_listing(indexes: &[IndexSchema], aliases: &AliasTable) -> Vec<String> {
    let broken: Vec<&Alias> = aliases.broken_aliases(indexes);
    aliases
        .aliases()
        .iter()
        .map(|alias| {
            let mark = if broken.contains(&alias) {
                "  BROKEN"
            } else {
                ""
            };
            format!("{:<32} -> {}{}", alias.name, alias.collection_name, mark)
        })
        .collect()
}

/// Describe how `name` resolves: target index, display name and whether
/// the target exists.
pub fn resolution(name: &str, indexes: &[IndexSchema], aliases: &AliasTable) -> Vec<String> {
    let index = aliases.resolve_to_index(name);
    let mut lines = Vec::new();
    if aliases.is_alias(name) {
        lines.push(format!("{} is an alias of {}", name, index));
    } else {
        lines.push(format!("{} is not an alias", name));
    }
    lines.push(format!("index:   {}", index));
    lines.push(format!("display: {}", aliases.display_name_for(index)));
    let others: Vec<&str> = aliases
        .aliases_for(index)
        .into_iter()
        .map(|a| a.name.as_str())
        .collect();
    if !others.is_empty() {
        lines.push(format!("aliases: {}", others.join(", ")));
    }
    if !indexes.iter().any(|i| i.name == index) {
        lines.push(format!("warning: no index named {} exists", index));
    }
    lines
}

pub async fn run_indexes(backend: &dyn SearchBackend) -> Result<()> {
    let (indexes, aliases) = load(backend).await?;
    if indexes.is_empty() {
        println!("No indexes.");
        return Ok(());
    }
    for line in index_listing(&indexes, &aliases) {
        println!("{}", line);
    }
    Ok(())
}

pub async fn run_aliases(backend: &dyn SearchBackend) -> Result<()> {
    let (indexes, aliases) = load(backend).await?;
    if aliases.is_empty() {
        println!("No aliases.");
        return Ok(());
    }
    let broken = aliases.broken_aliases(&indexes).len();
    for line in alias_listing(&indexes, &aliases) {
        println!("{}", line);
    }
    if broken > 0 {
        tracing::warn!(broken, "aliases point at missing indexes");
    }
    Ok(())
}

pub async fn run_resolve(backend: &dyn SearchBackend, name: &str) -> Result<()> {
    let (indexes, aliases) = load(backend).await?;
    for line in resolution(name, &indexes, &aliases) {
        println!("{}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ts_lens_core::backend::memory::InMemoryBackend;
    use ts_lens_core::models::FieldSchema;

    fn backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.add_index(IndexSchema::new(
            "products_v2",
            vec![FieldSchema::new("name", "string")],
        ));
        backend.add_index(IndexSchema::new("archive", Vec::new()));
        backend.set_alias(Alias::new("products", "products_v2"));
        backend.set_alias(Alias::new("shop", "products_v2"));
        backend.set_alias(Alias::new("old", "products_v1"));
        backend
    }

    #[tokio::test]
    async fn lists_indexes_by_display_name() {
        let (indexes, aliases) = load(&backend()).await.unwrap();
        let lines = index_listing(&indexes, &aliases);
        assert!(lines[0].starts_with("INDEX"));
        assert!(lines[1].starts_with("archive "));
        assert!(lines[2].starts_with("products (products_v2)"));
    }

    #[tokio::test]
    async fn flags_broken_aliases() {
        let (indexes, aliases) = load(&backend()).await.unwrap();
        let lines = alias_listing(&indexes, &aliases);
        assert_eq!(lines.len(), 3);
        assert!(!lines[0].contains("BROKEN"));
        assert!(lines[2].starts_with("old"));
        assert!(lines[2].ends_with("products_v1  BROKEN"));
    }

    #[tokio::test]
    async fn describes_resolution() {
        let (indexes, aliases) = load(&backend()).await.unwrap();

        let shop = resolution("shop", &indexes, &aliases);
        assert_eq!(shop[0], "shop is an alias of products_v2");
        assert_eq!(shop[2], "display: products");
        assert_eq!(shop[3], "aliases: products, shop");

        let plain = resolution("archive", &indexes, &aliases);
        assert_eq!(plain[0], "archive is not an alias");
        assert_eq!(plain.len(), 3);

        let broken = resolution("old", &indexes, &aliases);
        assert_eq!(
            broken.last().unwrap(),
            "warning: no index named products_v1 exists"
        );
    }

    #[tokio::test]
    async fn health_of_memory_backend() {
        run_health(&backend(), "memory").await.unwrap();
    }
}
