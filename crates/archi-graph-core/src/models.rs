//! Core data models used throughout Archi Graph.
//!
//! These types represent the content entities, media attachments, and the
//! composite metadata values (positions, relation sets) that flow through
//! the validation engine and the graph mutation API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::Namespace;

/// Identifier of a content entity (post, project, illustration).
pub type EntityId = i64;

/// Identifier of a media attachment.
pub type AttachmentId = i64;

/// The content type of an entity. Determines which metadata namespaces apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Post,
    Project,
    Illustration,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Post,
        EntityKind::Project,
        EntityKind::Illustration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Post => "post",
            EntityKind::Project => "project",
            EntityKind::Illustration => "illustration",
        }
    }

    /// Metadata namespaces in scope for this kind, in lookup order.
    pub fn namespaces(&self) -> &'static [Namespace] {
        match self {
            EntityKind::Post => &[Namespace::Graph],
            EntityKind::Project => &[Namespace::Graph, Namespace::Project],
            EntityKind::Illustration => &[Namespace::Graph, Namespace::Illustration],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" | "article" => Ok(EntityKind::Post),
            "project" | "archi_project" => Ok(EntityKind::Project),
            "illustration" | "archi_illustration" => Ok(EntityKind::Illustration),
            other => anyhow::bail!(
                "Unknown entity kind: '{}'. Must be post, project, or illustration.",
                other
            ),
        }
    }
}

/// A content item owned by the external content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub title: String,
    /// Primary visual (featured image), if one has been assigned.
    pub thumbnail_id: Option<AttachmentId>,
}

/// A media library item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub mime_type: String,
    pub url: String,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.trim().to_ascii_lowercase().starts_with("image/")
    }
}

/// 2D node coordinates in graph space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn to_value(self) -> Value {
        serde_json::json!({ "x": self.x, "y": self.y })
    }

    /// Reads a stored position. Anything that is not a well-formed `{x, y}`
    /// object of integers reads as the origin.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

/// One entry of a batch position save. Coordinates stay untyped so that the
/// position sanitizer can coerce malformed input instead of rejecting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub entity_id: EntityId,
    #[serde(default)]
    pub x: Value,
    #[serde(default)]
    pub y: Value,
}

/// Reads a stored relation set as a list of entity ids, ignoring entries
/// that are not integers.
pub fn relation_ids(value: &Value) -> Vec<EntityId> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_i64).collect(),
        _ => Vec::new(),
    }
}
