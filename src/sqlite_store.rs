//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the tables created by
//! [`crate::migrate`]: `entities`, `attachments`, and `entity_meta`.
//! Metadata values are stored JSON-encoded, one row per `(entity, key)`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use archi_graph_core::models::{Attachment, AttachmentId, Entity, EntityId, EntityKind};
use archi_graph_core::store::Store;

use crate::config::Config;

/// Open a pool on `[db].path` with WAL and foreign keys, creating the file
/// and its directory if needed.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let path = &config.db.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))
}

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database named in `[db].path`.
    pub async fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(connect(config).await?))
    }

    async fn allocate_id(&self, object_type: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO objects (object_type) VALUES (?)")
            .bind(object_type)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Create an entity and return its id.
    pub async fn insert_entity(&self, kind: EntityKind, title: &str) -> Result<EntityId> {
        let id = self.allocate_id("entity").await?;
        sqlx::query(
            "INSERT INTO entities (id, kind, title, thumbnail_id, created_at) VALUES (?, ?, ?, NULL, ?)",
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(title)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Register a media attachment and return its id.
    pub async fn insert_attachment(&self, mime_type: &str, url: &str) -> Result<AttachmentId> {
        let id = self.allocate_id("attachment").await?;
        sqlx::query("INSERT INTO attachments (id, mime_type, url, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(mime_type)
            .bind(url)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(id)
    }
}

fn entity_from_row(row: &SqliteRow) -> Result<Entity> {
    let kind: String = row.get("kind");
    Ok(Entity {
        id: row.get("id"),
        kind: kind.parse()?,
        title: row.get("title"),
        thumbnail_id: row.get("thumbnail_id"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        let row = sqlx::query("SELECT id, kind, title, thumbnail_id FROM entities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(entity_from_row).transpose()
    }

    async fn list_entities(&self, kinds: &[EntityKind]) -> Result<Vec<Entity>> {
        let rows = sqlx::query("SELECT id, kind, title, thumbnail_id FROM entities ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            let entity = entity_from_row(row)?;
            if kinds.contains(&entity.kind) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn get_meta(&self, id: EntityId, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT meta_value FROM entity_meta WHERE entity_id = ? AND meta_key = ?",
        )
        .bind(id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        raw.map(|s| {
            serde_json::from_str(&s)
                .with_context(|| format!("corrupt metadata value for entity {} key {}", id, key))
        })
        .transpose()
    }

    async fn set_meta(&self, id: EntityId, key: &str, value: &Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entity_meta (entity_id, meta_key, meta_value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(entity_id, meta_key) DO UPDATE SET
                meta_value = excluded.meta_value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_attachment(&self, id: AttachmentId) -> Result<Option<Attachment>> {
        let row = sqlx::query("SELECT id, mime_type, url FROM attachments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Attachment {
            id: r.get("id"),
            mime_type: r.get("mime_type"),
            url: r.get("url"),
        }))
    }

    async fn set_thumbnail(&self, id: EntityId, attachment: AttachmentId) -> Result<()> {
        let result = sqlx::query("UPDATE entities SET thumbnail_id = ? WHERE id = ?")
            .bind(attachment)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("entity not found: {}", id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("archi.sqlite");
        run_migrations(&config).await.unwrap();
        let store = SqliteStore::open(&config).await.unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn test_connect_creates_directory_and_enforces_foreign_keys() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("nested/dir/archi.sqlite");
        let pool = connect(&config).await.unwrap();
        assert!(config.db.path.exists());

        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_entities_and_attachments_share_ids() {
        let (_tmp, store) = open_temp().await;
        let a = store.insert_entity(EntityKind::Project, "Villa").await.unwrap();
        let img = store.insert_attachment("image/png", "/a.png").await.unwrap();
        let b = store.insert_entity(EntityKind::Post, "Essay").await.unwrap();
        assert!(a < img && img < b);

        assert!(store.get_entity(img).await.unwrap().is_none());
        assert!(store.get_attachment(a).await.unwrap().is_none());

        let projects = store.list_entities(&[EntityKind::Project]).await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].title, "Villa");
        assert_eq!(store.list_entities(&EntityKind::ALL).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_meta_upsert_roundtrip() {
        let (_tmp, store) = open_temp().await;
        let id = store.insert_entity(EntityKind::Post, "a").await.unwrap();

        assert_eq!(store.get_meta(id, "_archi_node_size").await.unwrap(), None);
        store.set_meta(id, "_archi_node_size", &json!(80)).await.unwrap();
        store.set_meta(id, "_archi_node_size", &json!(90)).await.unwrap();
        assert_eq!(
            store.get_meta(id, "_archi_node_size").await.unwrap(),
            Some(json!(90))
        );

        let position = json!({"x": 3, "y": -7});
        store.set_meta(id, "_archi_graph_position", &position).await.unwrap();
        assert_eq!(
            store.get_meta(id, "_archi_graph_position").await.unwrap(),
            Some(position)
        );
    }

    #[tokio::test]
    async fn test_set_thumbnail() {
        let (_tmp, store) = open_temp().await;
        let id = store.insert_entity(EntityKind::Illustration, "i").await.unwrap();
        let img = store.insert_attachment("image/jpeg", "/i.jpg").await.unwrap();
        store.set_thumbnail(id, img).await.unwrap();
        assert_eq!(
            store.get_entity(id).await.unwrap().unwrap().thumbnail_id,
            Some(img)
        );
        assert!(store.set_thumbnail(9999, img).await.is_err());
    }
}
