//! Graph mutation API.
//!
//! [`GraphEditor`] implements the operations the in-browser graph editor
//! calls: saving node positions, creating and deleting manual links,
//! assigning node images, toggling visibility, and batch-updating node
//! parameters. Every operation:
//!
//! 1. checks the caller's editor capability ([`Error::Forbidden`] otherwise),
//! 2. checks that referenced entities exist ([`Error::NotFound`]),
//! 3. writes through the [`MetaManager`],
//! 4. emits a cache invalidation signal if anything was written.
//!
//! Multi-entry operations are not transactional. Entries written before a
//! failing entry stay written, and the result reports which entries
//! succeeded.
//!
//! Relation sets are stored only on the source entity. `create_link(a, b)`
//! does not make `b` link back to `a`; callers that want symmetric links
//! create both directions.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result, ValidationError};
use crate::invalidate::{CacheInvalidator, Invalidation};
use crate::meta::{MetaEntry, MetaManager};
use crate::models::{relation_ids, AttachmentId, Entity, EntityId, Position, PositionUpdate};
use crate::schema::{Namespace, GRAPH_POSITION, RELATED_ARTICLES, SHOW_IN_GRAPH};
use crate::store::Store;

/// The authorization gate. Whoever authenticates the request decides
/// whether the caller may edit the graph.
pub trait EditorAccess: Sync {
    fn can_edit_graph(&self) -> bool;
}

impl EditorAccess for bool {
    fn can_edit_graph(&self) -> bool {
        *self
    }
}

/// Error details for one failed batch entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryError {
    pub error_kind: &'static str,
    pub message: String,
}

impl From<&Error> for EntryError {
    fn from(err: &Error) -> Self {
        Self {
            error_kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one entry of [`GraphEditor::save_positions_batch`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionOutcome {
    pub entity_id: EntityId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EntryError>,
}

/// Per-entry results of a batch position save, in request order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub results: Vec<PositionOutcome>,
}

impl BatchReport {
    pub fn saved(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.saved()
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }
}

/// Stateless request handlers for graph mutations.
#[derive(Clone)]
pub struct GraphEditor {
    meta: MetaManager,
    invalidator: Arc<dyn CacheInvalidator>,
}

impl GraphEditor {
    pub fn new(meta: MetaManager, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        Self { meta, invalidator }
    }

    pub fn meta(&self) -> &MetaManager {
        &self.meta
    }

    fn store(&self) -> &Arc<dyn Store> {
        self.meta.store()
    }

    fn authorize(&self, caller: &dyn EditorAccess) -> Result<()> {
        if caller.can_edit_graph() {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }

    async fn require_entity(&self, id: EntityId) -> Result<Entity> {
        self.store()
            .get_entity(id)
            .await?
            .ok_or_else(|| Error::entity_not_found(id))
    }

    fn signal(&self, reason: &'static str, entity_ids: Vec<EntityId>) {
        let signal = Invalidation::new(reason, entity_ids);
        if let Err(e) = self.invalidator.invalidate(&signal) {
            warn!(reason, error = %e, "cache invalidation failed");
        }
    }

    async fn write_position(&self, id: EntityId, x: &Value, y: &Value) -> Result<Position> {
        self.require_entity(id).await?;
        let stored = self
            .meta
            .update_meta(id, GRAPH_POSITION, &json!({ "x": x, "y": y }), Some(Namespace::Graph))
            .await?;
        Ok(Position::from_value(&stored))
    }

    /// Store a node position. Malformed coordinates coerce to integers (0
    /// when not numeric); this never fails once the entity exists.
    pub async fn save_position(
        &self,
        caller: &dyn EditorAccess,
        id: EntityId,
        x: &Value,
        y: &Value,
    ) -> Result<Position> {
        self.authorize(caller)?;
        let position = self.write_position(id, x, y).await?;
        debug!(entity_id = id, x = position.x, y = position.y, "position saved");
        self.signal("save_position", vec![id]);
        Ok(position)
    }

    /// Store many positions. Entries are applied in order and independently;
    /// a failing entry is reported and does not undo earlier ones.
    pub async fn save_positions_batch(
        &self,
        caller: &dyn EditorAccess,
        updates: &[PositionUpdate],
    ) -> Result<BatchReport> {
        self.authorize(caller)?;
        let mut report = BatchReport::default();
        for update in updates {
            let outcome = match self.write_position(update.entity_id, &update.x, &update.y).await {
                Ok(position) => PositionOutcome {
                    entity_id: update.entity_id,
                    success: true,
                    position: Some(position),
                    error: None,
                },
                Err(e) => {
                    debug!(entity_id = update.entity_id, error = %e, "batch position entry failed");
                    PositionOutcome {
                        entity_id: update.entity_id,
                        success: false,
                        position: None,
                        error: Some(EntryError::from(&e)),
                    }
                }
            };
            report.results.push(outcome);
        }
        let saved: Vec<EntityId> = report
            .results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.entity_id)
            .collect();
        if !saved.is_empty() {
            self.signal("save_positions", saved);
        }
        Ok(report)
    }

    async fn relations(&self, source: EntityId) -> Result<Vec<EntityId>> {
        let current = self
            .meta
            .get_meta(source, RELATED_ARTICLES, Some(Namespace::Graph))
            .await?;
        Ok(relation_ids(&current))
    }

    async fn write_relations(&self, source: EntityId, ids: Vec<EntityId>) -> Result<Vec<EntityId>> {
        let stored = self
            .meta
            .update_meta(source, RELATED_ARTICLES, &json!(ids), Some(Namespace::Graph))
            .await?;
        Ok(relation_ids(&stored))
    }

    /// Add `target` to the relation set of `source`. Idempotent.
    pub async fn create_link(
        &self,
        caller: &dyn EditorAccess,
        source: EntityId,
        target: EntityId,
    ) -> Result<Vec<EntityId>> {
        self.authorize(caller)?;
        self.require_entity(source).await?;
        self.require_entity(target).await?;

        let mut ids = self.relations(source).await?;
        if !ids.contains(&target) {
            ids.push(target);
        }
        let related = self.write_relations(source, ids).await?;
        debug!(source, target, "link created");
        self.signal("create_link", vec![source, target]);
        Ok(related)
    }

    /// Remove `target` from the relation set of `source`. Removing an absent
    /// link succeeds, and `target` need not exist any more.
    pub async fn delete_link(
        &self,
        caller: &dyn EditorAccess,
        source: EntityId,
        target: EntityId,
    ) -> Result<Vec<EntityId>> {
        self.authorize(caller)?;
        self.require_entity(source).await?;

        let ids: Vec<EntityId> = self
            .relations(source)
            .await?
            .into_iter()
            .filter(|id| *id != target)
            .collect();
        let related = self.write_relations(source, ids).await?;
        debug!(source, target, "link deleted");
        self.signal("delete_link", vec![source, target]);
        Ok(related)
    }

    /// Make `image` the entity's primary visual and return its URL.
    pub async fn update_node_image(
        &self,
        caller: &dyn EditorAccess,
        id: EntityId,
        image: AttachmentId,
    ) -> Result<String> {
        self.authorize(caller)?;
        self.require_entity(id).await?;

        let attachment = self
            .store()
            .get_attachment(image)
            .await?
            .ok_or_else(|| Error::InvalidImage {
                image_id: image,
                reason: "attachment not found".to_string(),
            })?;
        if !attachment.is_image() {
            return Err(Error::InvalidImage {
                image_id: image,
                reason: format!("attachment is {}, not an image", attachment.mime_type),
            });
        }

        self.store().set_thumbnail(id, image).await?;
        debug!(entity_id = id, image, "node image updated");
        self.signal("update_image", vec![id]);
        Ok(attachment.url)
    }

    /// Update several `graph` namespace fields at once.
    ///
    /// Every key is attempted, in the map's insertion order. If any key
    /// fails validation the call fails with [`Error::UpdateFailed`], listing
    /// both the failures and the keys that were written anyway.
    pub async fn update_node_params(
        &self,
        caller: &dyn EditorAccess,
        id: EntityId,
        params: &Map<String, Value>,
    ) -> Result<Vec<String>> {
        self.authorize(caller)?;
        self.require_entity(id).await?;

        let mut updated = Vec::new();
        let mut errors: Vec<ValidationError> = Vec::new();
        for (key, raw) in params {
            match self
                .meta
                .update_meta(id, key, raw, Some(Namespace::Graph))
                .await
            {
                Ok(_) => updated.push(key.clone()),
                Err(Error::Validation(e)) => errors.push(e),
                Err(e) => {
                    if !updated.is_empty() {
                        self.signal("update_params", vec![id]);
                    }
                    return Err(e);
                }
            }
        }

        if !updated.is_empty() {
            self.signal("update_params", vec![id]);
        }
        if errors.is_empty() {
            debug!(entity_id = id, count = updated.len(), "node params updated");
            Ok(updated)
        } else {
            Err(Error::UpdateFailed {
                entity_id: id,
                updated,
                errors,
            })
        }
    }

    /// Set whether the entity is shown in the graph.
    pub async fn toggle_visibility(
        &self,
        caller: &dyn EditorAccess,
        id: EntityId,
        visible: bool,
    ) -> Result<bool> {
        self.authorize(caller)?;
        self.require_entity(id).await?;
        let stored = self
            .meta
            .update_meta(id, SHOW_IN_GRAPH, &json!(visible), Some(Namespace::Graph))
            .await?;
        self.signal("toggle_visibility", vec![id]);
        Ok(stored == json!("1"))
    }

    /// All fields of an entity for the editor's side panel. Without a
    /// namespace, the namespaces of the entity's kind are used.
    pub async fn entity_meta(
        &self,
        caller: &dyn EditorAccess,
        id: EntityId,
        namespace: Option<Namespace>,
    ) -> Result<(Entity, Vec<MetaEntry>)> {
        self.authorize(caller)?;
        let entity = self.require_entity(id).await?;
        let entries = match namespace {
            Some(ns) => self.meta.get_all_meta(id, Some(ns)).await?,
            None => self.meta.get_all_meta_in(id, entity.kind.namespaces()).await?,
        };
        Ok((entity, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrorKind;
    use crate::invalidate::testing::RecordingInvalidator;
    use crate::models::EntityKind;
    use crate::schema::{SchemaRegistry, NODE_COLOR, NODE_SIZE, PRIORITY_LEVEL};
    use crate::store::memory::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        editor: GraphEditor,
        recorder: Arc<RecordingInvalidator>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let recorder = Arc::new(RecordingInvalidator::new());
        let meta = MetaManager::new(Arc::new(SchemaRegistry::builtin()), store.clone());
        let editor = GraphEditor::new(meta, recorder.clone());
        Fixture {
            store,
            editor,
            recorder,
        }
    }

    struct FailingInvalidator;

    impl CacheInvalidator for FailingInvalidator {
        fn invalidate(&self, _signal: &Invalidation) -> anyhow::Result<()> {
            anyhow::bail!("cache backend unavailable")
        }
    }

    #[tokio::test]
    async fn test_save_position_coerces_non_numeric() {
        let f = fixture();
        let id = f.store.insert_entity(EntityKind::Post, "a").unwrap();
        let pos = f
            .editor
            .save_position(&true, id, &json!("abc"), &json!(5))
            .await
            .unwrap();
        assert_eq!(pos, Position::new(0, 5));
        assert_eq!(f.recorder.count(), 1);
    }

    #[tokio::test]
    async fn test_save_position_missing_entity() {
        let f = fixture();
        let err = f
            .editor
            .save_position(&true, 999, &json!(1), &json!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { id: 999, .. }));
        assert_eq!(f.recorder.count(), 0);
    }

    #[tokio::test]
    async fn test_forbidden_before_anything_else() {
        let f = fixture();
        // Entity 12345 does not exist; the capability check still wins.
        let err = f
            .editor
            .save_position(&false, 12345, &json!(1), &json!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden));
        let err = f
            .editor
            .update_node_params(&false, 12345, &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden));
        assert_eq!(f.recorder.count(), 0);
    }

    #[tokio::test]
    async fn test_batch_partial_success() {
        let f = fixture();
        let id = f.store.insert_entity(EntityKind::Post, "a").unwrap();
        let updates = vec![
            PositionUpdate {
                entity_id: id,
                x: json!(10),
                y: json!(10),
            },
            PositionUpdate {
                entity_id: 999_999,
                x: json!(5),
                y: json!(5),
            },
        ];
        let report = f.editor.save_positions_batch(&true, &updates).await.unwrap();
        assert_eq!(report.saved(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_complete());
        assert_eq!(report.results[0].position, Some(Position::new(10, 10)));
        assert_eq!(report.results[1].error.as_ref().unwrap().error_kind, "NotFound");
        assert_eq!(f.recorder.count(), 1);
        assert_eq!(f.recorder.signals()[0].entity_ids, vec![id]);
    }

    #[tokio::test]
    async fn test_batch_all_failed_emits_no_signal() {
        let f = fixture();
        let updates = vec![PositionUpdate {
            entity_id: 404,
            x: json!(1),
            y: json!(1),
        }];
        let report = f.editor.save_positions_batch(&true, &updates).await.unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(f.recorder.count(), 0);
    }

    #[tokio::test]
    async fn test_create_link_idempotent() {
        let f = fixture();
        let a = f.store.insert_entity(EntityKind::Post, "a").unwrap();
        let b = f.store.insert_entity(EntityKind::Project, "b").unwrap();
        let once = f.editor.create_link(&true, a, b).await.unwrap();
        let twice = f.editor.create_link(&true, a, b).await.unwrap();
        assert_eq!(once, vec![b]);
        assert_eq!(once, twice);
        // Stored only on the source.
        let back = f
            .editor
            .meta()
            .get_meta(b, RELATED_ARTICLES, None)
            .await
            .unwrap();
        assert_eq!(back, json!([]));
    }

    #[tokio::test]
    async fn test_create_link_requires_both_entities() {
        let f = fixture();
        let a = f.store.insert_entity(EntityKind::Post, "a").unwrap();
        let err = f.editor.create_link(&true, a, 77).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { id: 77, .. }));
        let err = f.editor.create_link(&true, 78, a).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { id: 78, .. }));
    }

    #[tokio::test]
    async fn test_delete_link_absent_is_ok_and_reindexes() {
        let f = fixture();
        let a = f.store.insert_entity(EntityKind::Post, "a").unwrap();
        let b = f.store.insert_entity(EntityKind::Post, "b").unwrap();
        let c = f.store.insert_entity(EntityKind::Post, "c").unwrap();
        let d = f.store.insert_entity(EntityKind::Post, "d").unwrap();

        assert!(f.editor.delete_link(&true, a, b).await.unwrap().is_empty());

        for t in [b, c, d] {
            f.editor.create_link(&true, a, t).await.unwrap();
        }
        let remaining = f.editor.delete_link(&true, a, c).await.unwrap();
        assert_eq!(remaining, vec![b, d]);
        let stored = f.store.get_meta(a, RELATED_ARTICLES).await.unwrap();
        assert_eq!(stored, Some(json!([b, d])));
    }

    #[tokio::test]
    async fn test_delete_link_to_removed_entity() {
        let f = fixture();
        let a = f.store.insert_entity(EntityKind::Post, "a").unwrap();
        let b = f.store.insert_entity(EntityKind::Post, "b").unwrap();
        f.editor.create_link(&true, a, b).await.unwrap();
        f.store.remove_entity(b).unwrap();
        let remaining = f.editor.delete_link(&true, a, b).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_update_node_image() {
        let f = fixture();
        let id = f.store.insert_entity(EntityKind::Illustration, "i").unwrap();
        let img = f.store.insert_attachment("image/webp", "/uploads/i.webp").unwrap();
        let pdf = f.store.insert_attachment("application/pdf", "/uploads/i.pdf").unwrap();

        let url = f.editor.update_node_image(&true, id, img).await.unwrap();
        assert_eq!(url, "/uploads/i.webp");
        let entity = f.store.get_entity(id).await.unwrap().unwrap();
        assert_eq!(entity.thumbnail_id, Some(img));

        let err = f.editor.update_node_image(&true, id, pdf).await.unwrap_err();
        assert!(matches!(err, Error::InvalidImage { .. }));
        let err = f.editor.update_node_image(&true, id, 5000).await.unwrap_err();
        assert!(matches!(err, Error::InvalidImage { image_id: 5000, .. }));
        let err = f.editor.update_node_image(&true, 5001, img).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(f.recorder.count(), 1);
    }

    #[tokio::test]
    async fn test_update_params_partial_failure_keeps_valid_writes() {
        let f = fixture();
        let id = f.store.insert_entity(EntityKind::Post, "a").unwrap();
        f.store.set_meta(id, NODE_SIZE, &json!(70)).await.unwrap();

        let mut params = Map::new();
        params.insert(NODE_COLOR.to_string(), json!("#112233"));
        params.insert(NODE_SIZE.to_string(), json!(200));

        let err = f
            .editor
            .update_node_params(&true, id, &params)
            .await
            .unwrap_err();
        match err {
            Error::UpdateFailed {
                updated, errors, ..
            } => {
                assert_eq!(updated, vec![NODE_COLOR.to_string()]);
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].key, NODE_SIZE);
                assert_eq!(errors[0].kind, ValidationErrorKind::TooLarge);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(f.store.get_meta(id, NODE_SIZE).await.unwrap(), Some(json!(70)));
        assert_eq!(
            f.store.get_meta(id, NODE_COLOR).await.unwrap(),
            Some(json!("#112233"))
        );
        assert_eq!(f.recorder.count(), 1);
    }

    #[tokio::test]
    async fn test_update_params_rejects_other_namespaces() {
        let f = fixture();
        let id = f.store.insert_entity(EntityKind::Project, "p").unwrap();
        let mut params = Map::new();
        params.insert("_archi_project_client".to_string(), json!("Acme"));
        let err = f
            .editor
            .update_node_params(&true, id, &params)
            .await
            .unwrap_err();
        match err {
            Error::UpdateFailed { updated, errors, .. } => {
                assert!(updated.is_empty());
                assert_eq!(errors[0].kind, ValidationErrorKind::UnknownField);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(f.recorder.count(), 0);
    }

    #[tokio::test]
    async fn test_update_params_success() {
        let f = fixture();
        let id = f.store.insert_entity(EntityKind::Post, "a").unwrap();
        let mut params = Map::new();
        params.insert(PRIORITY_LEVEL.to_string(), json!("high"));
        params.insert(NODE_SIZE.to_string(), json!("100"));
        let updated = f.editor.update_node_params(&true, id, &params).await.unwrap();
        assert_eq!(
            updated,
            vec![PRIORITY_LEVEL.to_string(), NODE_SIZE.to_string()]
        );
        assert_eq!(
            f.editor.meta().get_meta(id, NODE_SIZE, None).await.unwrap(),
            json!(100)
        );
    }

    #[tokio::test]
    async fn test_toggle_visibility() {
        let f = fixture();
        let id = f.store.insert_entity(EntityKind::Post, "a").unwrap();
        assert!(f.editor.toggle_visibility(&true, id, true).await.unwrap());
        assert_eq!(
            f.store.get_meta(id, SHOW_IN_GRAPH).await.unwrap(),
            Some(json!("1"))
        );
        assert!(!f.editor.toggle_visibility(&true, id, false).await.unwrap());
        assert_eq!(f.recorder.count(), 2);
    }

    #[tokio::test]
    async fn test_invalidation_failure_is_not_an_error() {
        let store = Arc::new(InMemoryStore::new());
        let id = store.insert_entity(EntityKind::Post, "a").unwrap();
        let meta = MetaManager::new(Arc::new(SchemaRegistry::builtin()), store.clone());
        let editor = GraphEditor::new(meta, Arc::new(FailingInvalidator));
        assert!(editor.toggle_visibility(&true, id, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_entity_meta_uses_kind_namespaces() {
        let f = fixture();
        let id = f.store.insert_entity(EntityKind::Illustration, "i").unwrap();
        let (entity, entries) = f.editor.entity_meta(&true, id, None).await.unwrap();
        assert_eq!(entity.kind, EntityKind::Illustration);
        assert!(entries.iter().any(|e| e.key == "_archi_illustration_year"));
        assert!(!entries.iter().any(|e| e.key == "_archi_project_client"));
        let (_, graph_only) = f
            .editor
            .entity_meta(&true, id, Some(Namespace::Graph))
            .await
            .unwrap();
        assert_eq!(graph_only.len(), 9);
    }
}
