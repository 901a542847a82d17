//! # Archi Graph Core
//!
//! Runtime-agnostic logic for Archi Graph: the node metadata schema, the
//! sanitization/validation engine, the store abstraction, the metadata
//! facade, and the graph mutation API used by the in-browser editor.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//!
//! ```text
//! request ─▶ GraphEditor ─▶ MetaManager ─▶ Engine ─▶ SchemaRegistry
//!               │               │
//!               │               └──────▶ Store (external content store)
//!               └──▶ CacheInvalidator (fire-and-forget)
//! ```

pub mod editor;
pub mod engine;
pub mod error;
pub mod invalidate;
pub mod meta;
pub mod models;
pub mod schema;
pub mod store;

pub use editor::{BatchReport, EditorAccess, GraphEditor, PositionOutcome};
pub use engine::Engine;
pub use error::{Error, Result, ValidationError, ValidationErrorKind};
pub use invalidate::{CacheInvalidator, Invalidation};
pub use meta::{MetaEntry, MetaManager};
pub use models::{Attachment, AttachmentId, Entity, EntityId, EntityKind, Position, PositionUpdate};
pub use schema::{FieldDefinition, FieldType, Namespace, SchemaRegistry};
pub use store::Store;
