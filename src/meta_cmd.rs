//! `meta get` and `meta set` commands.
//!
//! Both go through the [`MetaManager`], so `meta set` applies the same
//! sanitization and validation as the HTTP API and reads fall back to field
//! defaults.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use archi_graph_core::{EntityId, MetaManager, Namespace, SchemaRegistry, Store};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

async fn open_meta(config: &Config) -> Result<MetaManager> {
    let store = SqliteStore::open(config).await?;
    Ok(MetaManager::new(
        Arc::new(SchemaRegistry::builtin()),
        Arc::new(store),
    ))
}

async fn require_entity(meta: &MetaManager, id: EntityId) -> Result<archi_graph_core::Entity> {
    meta.store()
        .get_entity(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("entity not found: {}", id))
}

/// Parse a CLI value as JSON, falling back to a plain string so that
/// `meta set 1 _archi_node_color '#ff0000'` needs no extra quoting.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub async fn run_meta_get(
    config: &Config,
    id: EntityId,
    key: Option<&str>,
    namespace: Option<Namespace>,
) -> Result<()> {
    let meta = open_meta(config).await?;
    let entity = require_entity(&meta, id).await?;

    if let Some(key) = key {
        let value = meta.get_meta(id, key, namespace).await?;
        println!("{}", serde_json::to_string(&value)?);
        return Ok(());
    }

    let entries = match namespace {
        Some(ns) => meta.get_all_meta(id, Some(ns)).await?,
        None => meta.get_all_meta_in(id, entity.kind.namespaces()).await?,
    };

    println!("{} #{} ({})", entity.title, entity.id, entity.kind);
    println!();
    println!("{:<34} {:<8} VALUE", "KEY", "TYPE");
    for entry in entries {
        println!(
            "{:<34} {:<8} {}",
            entry.key,
            entry.definition.kind,
            render(&entry.value)
        );
    }
    Ok(())
}

pub async fn run_meta_set(
    config: &Config,
    id: EntityId,
    key: &str,
    raw: &str,
    namespace: Option<Namespace>,
) -> Result<()> {
    let meta = open_meta(config).await?;
    require_entity(&meta, id).await?;

    let value = parse_value(raw);
    debug!(entity_id = id, key, raw = %value, "setting metadata from CLI");
    let stored = meta
        .update_meta(id, key, &value, namespace)
        .await
        .with_context(|| format!("Failed to set {} on entity {}", key, id))?;
    println!("{} = {}", key, serde_json::to_string(&stored)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value_accepts_json_and_bare_strings() {
        assert_eq!(parse_value("90"), json!(90));
        assert_eq!(parse_value("{\"x\":1,\"y\":2}"), json!({"x": 1, "y": 2}));
        assert_eq!(parse_value("#ff0000"), json!("#ff0000"));
        assert_eq!(parse_value("high"), json!("high"));
    }
}
