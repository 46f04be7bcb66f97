//! SQLite-backed [`Store`] implementation.
//!
//! Timestamps are persisted as epoch milliseconds. The one-thread-per-item
//! rule is enforced by the `UNIQUE(content_item_id)` constraint on
//! `chat_threads`: [`SqliteStore::get_or_create_thread`] inserts with
//! `ON CONFLICT DO NOTHING` and then reads back whichever row won.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use thoughtsynth_core::models::{
    from_millis, now_millis, Analysis, ChatMessage, ChatThread, ContentItem, ContentUpdate,
    NewChatMessage, NewContentItem, Tag, TagKind, Takeaway,
};
use thoughtsynth_core::store::{text_matches, Store};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const ITEM_COLUMNS: &str =
    "id, url, title, content_type, raw_content, ai_analysis, owner_id, created_at, updated_at";

fn row_to_item(row: &SqliteRow) -> Result<ContentItem> {
    let content_type: String = row.get("content_type");
    let analysis_json: Option<String> = row.get("ai_analysis");
    let ai_analysis = analysis_json
        .map(|json| serde_json::from_str::<Analysis>(&json))
        .transpose()
        .context("Corrupt ai_analysis column")?;

    Ok(ContentItem {
        id: row.get("id"),
        url: row.get("url"),
        title: row.get("title"),
        content_type: content_type.parse()?,
        raw_content: row.get("raw_content"),
        ai_analysis,
        owner_id: row.get("owner_id"),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    })
}

fn row_to_takeaway(row: &SqliteRow) -> Takeaway {
    Takeaway {
        id: row.get("id"),
        content_item_id: row.get("content_item_id"),
        owner_id: row.get("owner_id"),
        text: row.get("text"),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    }
}

fn row_to_tag(row: &SqliteRow) -> Result<Tag> {
    let kind: String = row.get("kind");
    Ok(Tag {
        id: row.get("id"),
        content_item_id: row.get("content_item_id"),
        name: row.get("name"),
        kind: kind.parse()?,
        created_at: from_millis(row.get("created_at")),
    })
}

fn row_to_thread(row: &SqliteRow) -> ChatThread {
    ChatThread {
        id: row.get("id"),
        content_item_id: row.get("content_item_id"),
        created_at: from_millis(row.get("created_at")),
    }
}

fn row_to_message(row: &SqliteRow) -> Result<ChatMessage> {
    let sender_kind: String = row.get("sender_kind");
    Ok(ChatMessage {
        id: row.get("id"),
        thread_id: row.get("thread_id"),
        sender_kind: sender_kind.parse()?,
        sender_id: row.get("sender_id"),
        sender_name: row.get("sender_name"),
        text: row.get("text"),
        created_at: from_millis(row.get("created_at")),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_content_item(&self, item: &NewContentItem) -> Result<ContentItem> {
        let now = now_millis();
        let analysis_json = item
            .ai_analysis
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO content_items (url, title, content_type, raw_content, ai_analysis,
                                       owner_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.url)
        .bind(&item.title)
        .bind(item.content_type.as_str())
        .bind(&item.raw_content)
        .bind(&analysis_json)
        .bind(&item.owner_id)
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(ContentItem {
            id: result.last_insert_rowid(),
            url: item.url.clone(),
            title: item.title.clone(),
            content_type: item.content_type,
            raw_content: item.raw_content.clone(),
            ai_analysis: item.ai_analysis.clone(),
            owner_id: item.owner_id.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_content_item(&self, id: i64) -> Result<Option<ContentItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM content_items WHERE id = ?",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_item).transpose()
    }

    async fn list_content_items(&self, owner_id: &str, limit: i64) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM content_items WHERE owner_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            ITEM_COLUMNS
        ))
        .bind(owner_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect()
    }

    async fn update_content_item(
        &self,
        id: i64,
        update: &ContentUpdate,
    ) -> Result<Option<ContentItem>> {
        let result = sqlx::query(
            r#"
            UPDATE content_items SET
                title = COALESCE(?, title),
                raw_content = COALESCE(?, raw_content),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.title)
        .bind(&update.raw_content)
        .bind(now_millis().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_content_item(id).await
    }

    async fn delete_content_item(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM chat_messages WHERE thread_id IN (SELECT id FROM chat_threads WHERE content_item_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        for table in ["chat_threads", "content_tags", "takeaways"] {
            sqlx::query(&format!("DELETE FROM {} WHERE content_item_id = ?", table))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query("DELETE FROM content_items WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn search_content_items(
        &self,
        owner_id: &str,
        query: &str,
        limit: i64,
    ) -> Result<Vec<ContentItem>> {
        // SQLite's lower() folds ASCII only, so matching happens here
        let needle = query.to_lowercase();
        let limit = usize::try_from(limit).unwrap_or(0);
        let sql = format!(
            "SELECT {} FROM content_items WHERE owner_id = ?1 ORDER BY created_at DESC, id DESC",
            ITEM_COLUMNS
        );
        let mut rows = sqlx::query(&sql).bind(owner_id).fetch(&self.pool);

        let mut items = Vec::new();
        while items.len() < limit {
            let Some(row) = rows.try_next().await? else {
                break;
            };
            let item = row_to_item(&row)?;
            if text_matches(&item, &needle) {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn create_takeaway(
        &self,
        content_item_id: i64,
        owner_id: &str,
        text: &str,
    ) -> Result<Takeaway> {
        let now = now_millis();
        let result = sqlx::query(
            "INSERT INTO takeaways (content_item_id, owner_id, text, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(content_item_id)
        .bind(owner_id)
        .bind(text)
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(Takeaway {
            id: result.last_insert_rowid(),
            content_item_id,
            owner_id: owner_id.to_string(),
            text: text.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_takeaway(&self, id: i64) -> Result<Option<Takeaway>> {
        let row = sqlx::query(
            "SELECT id, content_item_id, owner_id, text, created_at, updated_at FROM takeaways WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_takeaway))
    }

    async fn update_takeaway(&self, id: i64, text: &str) -> Result<Option<Takeaway>> {
        let result = sqlx::query("UPDATE takeaways SET text = ?, updated_at = ? WHERE id = ?")
            .bind(text)
            .bind(now_millis().timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_takeaway(id).await
    }

    async fn list_takeaways(&self, content_item_id: i64) -> Result<Vec<Takeaway>> {
        let rows = sqlx::query(
            "SELECT id, content_item_id, owner_id, text, created_at, updated_at FROM takeaways WHERE content_item_id = ? ORDER BY id ASC",
        )
        .bind(content_item_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_takeaway).collect())
    }

    async fn create_tag(&self, content_item_id: i64, name: &str, kind: TagKind) -> Result<Tag> {
        let now = now_millis();
        let result = sqlx::query(
            "INSERT INTO content_tags (content_item_id, name, kind, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(content_item_id)
        .bind(name)
        .bind(kind.as_str())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(Tag {
            id: result.last_insert_rowid(),
            content_item_id,
            name: name.to_string(),
            kind,
            created_at: now,
        })
    }

    async fn list_tags(&self, content_item_id: i64) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            "SELECT id, content_item_id, name, kind, created_at FROM content_tags WHERE content_item_id = ? ORDER BY id ASC",
        )
        .bind(content_item_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_tag).collect()
    }

    async fn get_thread(&self, content_item_id: i64) -> Result<Option<ChatThread>> {
        let row = sqlx::query(
            "SELECT id, content_item_id, created_at FROM chat_threads WHERE content_item_id = ?",
        )
        .bind(content_item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_thread))
    }

    async fn get_or_create_thread(&self, content_item_id: i64) -> Result<ChatThread> {
        sqlx::query(
            r#"
            INSERT INTO chat_threads (content_item_id, created_at)
            VALUES (?, ?)
            ON CONFLICT(content_item_id) DO NOTHING
            "#,
        )
        .bind(content_item_id)
        .bind(now_millis().timestamp_millis())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create thread for content item {}", content_item_id))?;

        self.get_thread(content_item_id)
            .await?
            .with_context(|| format!("Thread for content item {} vanished", content_item_id))
    }

    async fn append_message(&self, message: NewChatMessage) -> Result<ChatMessage> {
        let now = now_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO chat_messages (thread_id, sender_kind, sender_id, sender_name, text, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.thread_id())
        .bind(message.sender_kind().as_str())
        .bind(message.sender_id())
        .bind(message.sender_name())
        .bind(message.text())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(message.into_message(result.last_insert_rowid(), now))
    }

    async fn list_messages(&self, thread_id: i64) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, thread_id, sender_kind, sender_id, sender_name, text, created_at
            FROM chat_messages
            WHERE thread_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }
}
