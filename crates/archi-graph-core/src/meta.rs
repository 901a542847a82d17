//! Metadata facade.
//!
//! [`MetaManager`] composes the [`Engine`] with a [`Store`]: reads resolve
//! absent values to the field default, writes are sanitized and validated
//! before anything reaches the store.
//!
//! Reads do not re-sanitize. A value stored under an older schema is
//! returned as stored even if the current rules would reject it.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::engine::Engine;
use crate::error::Result;
use crate::models::EntityId;
use crate::schema::{FieldDefinition, FieldSummary, Namespace, SchemaRegistry};
use crate::store::Store;

/// One field of an entity, with its resolved value and definition.
#[derive(Debug, Clone, Serialize)]
pub struct MetaEntry {
    pub key: &'static str,
    pub value: Value,
    pub definition: FieldSummary,
}

/// Validated access to per-entity metadata.
#[derive(Clone)]
pub struct MetaManager {
    engine: Engine,
    store: Arc<dyn Store>,
}

/// Whether a stored value counts as "not set".
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

impl MetaManager {
    pub fn new(schema: Arc<SchemaRegistry>, store: Arc<dyn Store>) -> Self {
        Self {
            engine: Engine::new(schema),
            store,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Read a value, falling back to the field default when nothing (or an
    /// empty value) is stored. Unknown keys without a stored value read as
    /// `null`.
    pub async fn get_meta(
        &self,
        id: EntityId,
        key: &str,
        namespace: Option<Namespace>,
    ) -> Result<Value> {
        let raw = self.store.get_meta(id, key).await?;
        match raw {
            Some(v) if !is_empty(&v) => Ok(v),
            _ => Ok(self
                .engine
                .schema()
                .lookup(key, namespace)
                .map(|def| def.default.clone())
                .unwrap_or(Value::Null)),
        }
    }

    /// Sanitize, validate, and write. Nothing is written when validation
    /// fails; the validation error is returned unchanged.
    pub async fn update_meta(
        &self,
        id: EntityId,
        key: &str,
        raw: &Value,
        namespace: Option<Namespace>,
    ) -> Result<Value> {
        let value = self.engine.clean(key, raw, namespace)?;
        self.store.set_meta(id, key, &value).await?;
        debug!(entity_id = id, key, "metadata updated");
        Ok(value)
    }

    /// Every defined field of `namespace` (or of all namespaces) with its
    /// current value, in declared order.
    pub async fn get_all_meta(
        &self,
        id: EntityId,
        namespace: Option<Namespace>,
    ) -> Result<Vec<MetaEntry>> {
        match namespace {
            Some(ns) => self.get_all_meta_in(id, &[ns]).await,
            None => self.get_all_meta_in(id, &Namespace::ALL).await,
        }
    }

    /// Like [`get_all_meta`](Self::get_all_meta) for an explicit list of
    /// namespaces, e.g. the ones an entity kind uses.
    pub async fn get_all_meta_in(
        &self,
        id: EntityId,
        namespaces: &[Namespace],
    ) -> Result<Vec<MetaEntry>> {
        let defs: Vec<&FieldDefinition> = namespaces
            .iter()
            .flat_map(|ns| self.engine.schema().definitions_for(*ns))
            .collect();
        let mut entries = Vec::with_capacity(defs.len());
        for def in defs {
            let value = self.get_meta(id, def.key, Some(def.namespace)).await?;
            entries.push(MetaEntry {
                key: def.key,
                value,
                definition: def.summary(),
            });
        }
        Ok(entries)
    }
}
