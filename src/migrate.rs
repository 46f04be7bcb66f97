use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Content items
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            content_type TEXT NOT NULL,
            raw_content TEXT NOT NULL,
            ai_analysis TEXT,
            owner_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS takeaways (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_item_id INTEGER NOT NULL,
            owner_id TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (content_item_id) REFERENCES content_items(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_item_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (content_item_id) REFERENCES content_items(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // One thread per content item, enforced here
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_threads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_item_id INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(content_item_id),
            FOREIGN KEY (content_item_id) REFERENCES content_items(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            thread_id INTEGER NOT NULL,
            sender_kind TEXT NOT NULL,
            sender_id TEXT,
            sender_name TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (thread_id) REFERENCES chat_threads(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Local vector index (non-authoritative, no foreign keys)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_vectors (
            id TEXT PRIMARY KEY,
            content_id INTEGER NOT NULL,
            owner_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            dims INTEGER NOT NULL,
            vector BLOB NOT NULL,
            metadata_json TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_content_items_owner ON content_items(owner_id, created_at DESC)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_takeaways_content ON takeaways(content_item_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tags_content ON content_tags(content_item_id)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_thread ON chat_messages(thread_id, created_at, id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_content ON content_vectors(content_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_owner ON content_vectors(owner_id)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
