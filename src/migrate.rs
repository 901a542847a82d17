use anyhow::Result;

use crate::config::Config;
use crate::sqlite_store::connect;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = connect(config).await?;

    // Entities and attachments share one id sequence
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS objects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_type TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            thumbnail_id INTEGER,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (id) REFERENCES objects(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attachments (
            id INTEGER PRIMARY KEY,
            mime_type TEXT NOT NULL,
            url TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (id) REFERENCES objects(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // One JSON-encoded value per (entity, key)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entity_meta (
            entity_id INTEGER NOT NULL,
            meta_key TEXT NOT NULL,
            meta_value TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (entity_id, meta_key),
            FOREIGN KEY (entity_id) REFERENCES entities(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entity_meta_key ON entity_meta(meta_key)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
