//! In-memory [`Store`] implementation for testing and embedding.
//!
//! Uses `HashMap` and `BTreeMap` behind `std::sync::RwLock` for thread safety.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Attachment, AttachmentId, Entity, EntityId, EntityKind};

use super::Store;

#[derive(Default)]
struct Inner {
    next_id: i64,
    entities: BTreeMap<EntityId, Entity>,
    attachments: HashMap<AttachmentId, Attachment>,
    meta: HashMap<(EntityId, String), Value>,
}

impl Inner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory store for tests and single-process setups.
///
/// Entities and attachments share one id sequence, the way a content
/// store that keeps media as posts would.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Create an entity and return its id.
    pub fn insert_entity(&self, kind: EntityKind, title: &str) -> Result<EntityId> {
        let mut inner = self.write()?;
        let id = inner.allocate_id();
        inner.entities.insert(
            id,
            Entity {
                id,
                kind,
                title: title.to_string(),
                thumbnail_id: None,
            },
        );
        Ok(id)
    }

    /// Register a media attachment and return its id.
    pub fn insert_attachment(&self, mime_type: &str, url: &str) -> Result<AttachmentId> {
        let mut inner = self.write()?;
        let id = inner.allocate_id();
        inner.attachments.insert(
            id,
            Attachment {
                id,
                mime_type: mime_type.to_string(),
                url: url.to_string(),
            },
        );
        Ok(id)
    }

    /// Remove an entity. Its metadata is dropped with it.
    pub fn remove_entity(&self, id: EntityId) -> Result<bool> {
        let mut inner = self.write()?;
        inner.meta.retain(|(entity, _), _| *entity != id);
        Ok(inner.entities.remove(&id).is_some())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        Ok(self.read()?.entities.get(&id).cloned())
    }

    async fn list_entities(&self, kinds: &[EntityKind]) -> Result<Vec<Entity>> {
        Ok(self
            .read()?
            .entities
            .values()
            .filter(|e| kinds.contains(&e.kind))
            .cloned()
            .collect())
    }

    async fn get_meta(&self, id: EntityId, key: &str) -> Result<Option<Value>> {
        Ok(self.read()?.meta.get(&(id, key.to_string())).cloned())
    }

    async fn set_meta(&self, id: EntityId, key: &str, value: &Value) -> Result<()> {
        self.write()?
            .meta
            .insert((id, key.to_string()), value.clone());
        Ok(())
    }

    async fn get_attachment(&self, id: AttachmentId) -> Result<Option<Attachment>> {
        Ok(self.read()?.attachments.get(&id).cloned())
    }

    async fn set_thumbnail(&self, id: EntityId, attachment: AttachmentId) -> Result<()> {
        let mut inner = self.write()?;
        match inner.entities.get_mut(&id) {
            Some(entity) => {
                entity.thumbnail_id = Some(attachment);
                Ok(())
            }
            None => bail!("entity not found: {}", id),
        }
    }
}
