//! Error types for metadata validation and graph mutations.

use serde::Serialize;
use thiserror::Error;

use crate::models::{AttachmentId, EntityId};

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which validation rule rejected a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationErrorKind {
    UnknownField,
    InvalidValue,
    TooSmall,
    TooLarge,
    TooLong,
    BadFormat,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::UnknownField => "UnknownField",
            ValidationErrorKind::InvalidValue => "InvalidValue",
            ValidationErrorKind::TooSmall => "TooSmall",
            ValidationErrorKind::TooLarge => "TooLarge",
            ValidationErrorKind::TooLong => "TooLong",
            ValidationErrorKind::BadFormat => "BadFormat",
        }
    }
}

/// A schema-rule violation for a single metadata key.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{key}: {message}")]
pub struct ValidationError {
    pub key: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(key: impl Into<String>, kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Graph editor errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: i64 },

    #[error("insufficient permissions to edit the graph")]
    Forbidden,

    #[error("invalid image {image_id}: {reason}")]
    InvalidImage {
        image_id: AttachmentId,
        reason: String,
    },

    #[error("validation failed for {0}")]
    Validation(#[from] ValidationError),

    #[error("update failed for entity {entity_id}: {}", summarize(.errors))]
    UpdateFailed {
        entity_id: EntityId,
        /// Keys written before or despite the failures. They are not rolled back.
        updated: Vec<String>,
        errors: Vec<ValidationError>,
    },

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub fn entity_not_found(id: EntityId) -> Self {
        Error::NotFound { what: "entity", id }
    }

    /// Machine-readable error kind used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NotFound",
            Error::Forbidden => "Forbidden",
            Error::InvalidImage { .. } => "InvalidImage",
            Error::Validation(_) => "ValidationError",
            Error::UpdateFailed { .. } => "UpdateFailed",
            Error::Store(_) => "Internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } | Error::InvalidImage { .. } => 404,
            Error::Forbidden => 403,
            Error::Validation(_) => 400,
            Error::UpdateFailed { .. } | Error::Store(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::entity_not_found(3).http_status(), 404);
        assert_eq!(Error::Forbidden.http_status(), 403);
        let invalid = Error::InvalidImage {
            image_id: 9,
            reason: "not an image".into(),
        };
        assert_eq!(invalid.http_status(), 404);
        let failed = Error::UpdateFailed {
            entity_id: 1,
            updated: vec![],
            errors: vec![],
        };
        assert_eq!(failed.http_status(), 500);
        assert_eq!(failed.kind(), "UpdateFailed");
    }

    #[test]
    fn test_update_failed_message_lists_keys() {
        let err = Error::UpdateFailed {
            entity_id: 7,
            updated: vec!["_archi_node_color".into()],
            errors: vec![ValidationError::new(
                "_archi_node_size",
                ValidationErrorKind::TooLarge,
                "must be at most 120",
            )],
        };
        let msg = err.to_string();
        assert!(msg.contains("entity 7"));
        assert!(msg.contains("_archi_node_size: must be at most 120"));
    }
}
