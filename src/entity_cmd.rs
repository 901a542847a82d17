//! `entity` and `attachment` commands.
//!
//! The content store normally owns entities and media; these commands seed
//! the local SQLite store so the editor API has something to work on.

use anyhow::Result;

use archi_graph_core::{EntityKind, Store};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn run_entity_add(config: &Config, kind: EntityKind, title: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let id = store.insert_entity(kind, title).await?;
    println!("{}", id);
    Ok(())
}

pub async fn run_entity_list(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let entities = store.list_entities(&EntityKind::ALL).await?;

    if entities.is_empty() {
        println!("No entities.");
        return Ok(());
    }

    println!("{:<8} {:<14} {:<10} TITLE", "ID", "KIND", "THUMBNAIL");
    for entity in entities {
        let thumbnail = entity
            .thumbnail_id
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:<14} {:<10} {}",
            entity.id, entity.kind, thumbnail, entity.title
        );
    }
    Ok(())
}

pub async fn run_attachment_add(config: &Config, url: &str, mime_type: &str) -> Result<()> {
    if url.trim().is_empty() {
        anyhow::bail!("attachment url must not be empty");
    }
    let store = SqliteStore::open(config).await?;
    let id = store.insert_attachment(mime_type.trim(), url.trim()).await?;
    println!("{}", id);
    Ok(())
}
