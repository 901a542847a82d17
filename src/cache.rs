//! Rendered graph node listing with TTL caching.
//!
//! [`GraphCache`] assembles the public node list served by `GET /graph/nodes`:
//! every entity whose `_archi_show_in_graph` flag is `"1"`, with its visual
//! parameters, position, relations, and thumbnail URL. The list is rebuilt
//! at most once per `cache.ttl_secs`, and dropped immediately whenever the
//! [`GraphEditor`](archi_graph_core::GraphEditor) reports a mutation through
//! the [`CacheInvalidator`] trait.
//!
//! Each invalidation bumps a generation counter. A rebuild that overlapped
//! an invalidation is still returned to its caller but never stored, so a
//! listing assembled from pre-mutation values cannot outlive the mutation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use archi_graph_core::models::relation_ids;
use archi_graph_core::schema::{
    GRAPH_POSITION, HIDE_LINKS, NODE_COLOR, NODE_SHAPE, NODE_SIZE, PIN_NODE, PRIORITY_LEVEL,
    RELATED_ARTICLES, SHOW_IN_GRAPH,
};
use archi_graph_core::{
    CacheInvalidator, Entity, EntityId, EntityKind, Invalidation, MetaManager, Namespace, Position,
};

/// One visible node of the graph.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: EntityId,
    pub kind: EntityKind,
    pub title: String,
    pub color: String,
    pub size: i64,
    pub priority: String,
    pub shape: String,
    pub pinned: bool,
    pub hide_links: bool,
    pub position: Position,
    pub related: Vec<EntityId>,
    pub thumbnail_url: Option<String>,
}

/// Response body for `GET /graph/nodes`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub generated_at: DateTime<Utc>,
    pub cached: bool,
}

struct Cached {
    nodes: Arc<Vec<GraphNode>>,
    generated_at: DateTime<Utc>,
    built: Instant,
}

pub struct GraphCache {
    meta: MetaManager,
    ttl: Duration,
    slot: RwLock<Option<Cached>>,
    generation: AtomicU64,
}

fn as_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_flag(value: &Value) -> bool {
    matches!(value.as_str(), Some("1"))
}

impl GraphCache {
    pub fn new(meta: MetaManager, ttl: Duration) -> Self {
        Self {
            meta,
            ttl,
            slot: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Current node listing, rebuilt when stale or invalidated.
    pub async fn snapshot(&self) -> archi_graph_core::Result<GraphSnapshot> {
        if let Ok(slot) = self.slot.read() {
            if let Some(cached) = slot.as_ref() {
                if cached.built.elapsed() < self.ttl {
                    return Ok(GraphSnapshot {
                        nodes: cached.nodes.as_ref().clone(),
                        generated_at: cached.generated_at,
                        cached: true,
                    });
                }
            }
        }

        let started = self.generation.load(Ordering::SeqCst);
        let nodes = Arc::new(self.build().await?);
        let generated_at = Utc::now();
        if let Ok(mut slot) = self.slot.write() {
            // Checked under the write lock; `invalidate` bumps while holding it.
            if self.generation.load(Ordering::SeqCst) == started {
                *slot = Some(Cached {
                    nodes: nodes.clone(),
                    generated_at,
                    built: Instant::now(),
                });
            } else {
                debug!("graph node listing invalidated during rebuild, not stored");
            }
        }
        debug!(count = nodes.len(), "graph node listing rebuilt");
        Ok(GraphSnapshot {
            nodes: nodes.as_ref().clone(),
            generated_at,
            cached: false,
        })
    }

    async fn build(&self) -> archi_graph_core::Result<Vec<GraphNode>> {
        let entities = self.meta.store().list_entities(&EntityKind::ALL).await?;
        let mut nodes = Vec::new();
        for entity in entities {
            if let Some(node) = self.node(entity).await? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    async fn field(&self, id: EntityId, key: &str) -> archi_graph_core::Result<Value> {
        self.meta.get_meta(id, key, Some(Namespace::Graph)).await
    }

    async fn node(&self, entity: Entity) -> archi_graph_core::Result<Option<GraphNode>> {
        let id = entity.id;
        if !as_flag(&self.field(id, SHOW_IN_GRAPH).await?) {
            return Ok(None);
        }

        let thumbnail_url = match entity.thumbnail_id {
            Some(image) => self
                .meta
                .store()
                .get_attachment(image)
                .await?
                .map(|a| a.url),
            None => None,
        };

        Ok(Some(GraphNode {
            id,
            kind: entity.kind,
            title: entity.title,
            color: as_string(self.field(id, NODE_COLOR).await?),
            size: self.field(id, NODE_SIZE).await?.as_i64().unwrap_or(60),
            priority: as_string(self.field(id, PRIORITY_LEVEL).await?),
            shape: as_string(self.field(id, NODE_SHAPE).await?),
            pinned: as_flag(&self.field(id, PIN_NODE).await?),
            hide_links: as_flag(&self.field(id, HIDE_LINKS).await?),
            position: Position::from_value(&self.field(id, GRAPH_POSITION).await?),
            related: relation_ids(&self.field(id, RELATED_ARTICLES).await?),
            thumbnail_url,
        }))
    }

    /// Whether a listing is currently held, fresh or not.
    pub fn is_populated(&self) -> bool {
        self.slot.read().map(|s| s.is_some()).unwrap_or(false)
    }
}

impl CacheInvalidator for GraphCache {
    fn invalidate(&self, signal: &Invalidation) -> anyhow::Result<()> {
        let mut slot = self
            .slot
            .write()
            .map_err(|_| anyhow::anyhow!("graph cache lock poisoned"))?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        *slot = None;
        debug!(reason = signal.reason, entities = ?signal.entity_ids, "graph cache invalidated");
        Ok(())
    }
}
