//! Storage abstraction for Archi Graph.
//!
//! The [`Store`] trait is the boundary to the external content store: it
//! answers whether entities and attachments exist and reads/writes one
//! opaque metadata value per `(entity, key)` pair. The core never creates
//! or deletes entities; creating them is an inherent method of each
//! concrete backend.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Concurrency
//!
//! Reads and writes are individually atomic, but nothing here offers a
//! compare-and-swap. Read-modify-write sequences built on top of this trait
//! (relation sets, for example) race when two requests target the same
//! `(entity, key)` concurrently; the last write wins.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Attachment, AttachmentId, Entity, EntityId, EntityKind};

/// Abstract storage backend for entity metadata.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_entity`](Store::get_entity) | Look up an entity by id |
/// | [`list_entities`](Store::list_entities) | All entities of the given kinds |
/// | [`get_meta`](Store::get_meta) | Read one raw metadata value |
/// | [`set_meta`](Store::set_meta) | Write one metadata value |
/// | [`get_attachment`](Store::get_attachment) | Look up a media attachment |
/// | [`set_thumbnail`](Store::set_thumbnail) | Assign an entity's primary visual |
#[async_trait]
pub trait Store: Send + Sync {
    /// Retrieve an entity by id, or `None` if it does not exist.
    async fn get_entity(&self, id: EntityId) -> Result<Option<Entity>>;

    /// All entities whose kind is in `kinds`, ordered by id.
    async fn list_entities(&self, kinds: &[EntityKind]) -> Result<Vec<Entity>>;

    /// Read the stored value for `key`, or `None` if nothing was written.
    async fn get_meta(&self, id: EntityId, key: &str) -> Result<Option<Value>>;

    /// Insert or replace the stored value for `key`.
    async fn set_meta(&self, id: EntityId, key: &str, value: &Value) -> Result<()>;

    /// Retrieve a media attachment by id.
    async fn get_attachment(&self, id: AttachmentId) -> Result<Option<Attachment>>;

    /// Set `attachment` as the entity's featured image.
    async fn set_thumbnail(&self, id: EntityId, attachment: AttachmentId) -> Result<()>;
}
