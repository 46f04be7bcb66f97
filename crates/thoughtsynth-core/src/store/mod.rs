//! Storage abstraction for ThoughtSynth.
//!
//! The [`Store`] trait defines every persistence operation the ingestion,
//! content and chat pipelines need, so the HTTP layer can run against
//! SQLite in production and [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    ChatMessage, ChatThread, ContentItem, ContentUpdate, NewChatMessage, NewContentItem, Tag,
    TagKind, Takeaway,
};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_content_item`](Store::create_content_item) | Insert a content item, assigning id and timestamps |
/// | [`list_content_items`](Store::list_content_items) | Owner's items, newest first |
/// | [`delete_content_item`](Store::delete_content_item) | Remove an item with its takeaways, tags, thread and messages |
/// | [`search_content_items`](Store::search_content_items) | Case-insensitive substring match on title or body |
/// | [`get_or_create_thread`](Store::get_or_create_thread) | The single thread for an item, created if absent |
/// | [`append_message`](Store::append_message) | Add a message to a thread |
/// | [`list_messages`](Store::list_messages) | A thread's messages, oldest first |
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_content_item(&self, item: &NewContentItem) -> Result<ContentItem>;

    async fn get_content_item(&self, id: i64) -> Result<Option<ContentItem>>;

    /// Items owned by `owner_id`, ordered by `created_at` descending.
    async fn list_content_items(&self, owner_id: &str, limit: i64) -> Result<Vec<ContentItem>>;

    /// Apply a partial update and bump `updated_at`. Returns `None` if the
    /// item does not exist.
    async fn update_content_item(
        &self,
        id: i64,
        update: &ContentUpdate,
    ) -> Result<Option<ContentItem>>;

    /// Delete an item and everything derived from it in the store.
    ///
    /// Returns `false` if no such item existed.
    async fn delete_content_item(&self, id: i64) -> Result<bool>;

    /// Owner's items whose title or body contains `query`, newest first.
    ///
    /// Matching folds case with Unicode rules; see [`text_matches`].
    async fn search_content_items(
        &self,
        owner_id: &str,
        query: &str,
        limit: i64,
    ) -> Result<Vec<ContentItem>>;

    async fn create_takeaway(
        &self,
        content_item_id: i64,
        owner_id: &str,
        text: &str,
    ) -> Result<Takeaway>;

    async fn get_takeaway(&self, id: i64) -> Result<Option<Takeaway>>;

    async fn update_takeaway(&self, id: i64, text: &str) -> Result<Option<Takeaway>>;

    /// Takeaways for an item in creation order.
    async fn list_takeaways(&self, content_item_id: i64) -> Result<Vec<Takeaway>>;

    async fn create_tag(&self, content_item_id: i64, name: &str, kind: TagKind) -> Result<Tag>;

    async fn list_tags(&self, content_item_id: i64) -> Result<Vec<Tag>>;

    /// The thread for an item, without creating one.
    async fn get_thread(&self, content_item_id: i64) -> Result<Option<ChatThread>>;

    /// Return the item's thread, creating it if absent.
    ///
    /// Concurrent callers for the same item must all observe the same
    /// thread; at most one is ever persisted.
    async fn get_or_create_thread(&self, content_item_id: i64) -> Result<ChatThread>;

    async fn append_message(&self, message: NewChatMessage) -> Result<ChatMessage>;

    /// Messages ordered by `created_at` ascending, ties broken by id.
    async fn list_messages(&self, thread_id: i64) -> Result<Vec<ChatMessage>>;
}

/// Case-insensitive substring test shared by every backend.
///
/// `needle` must already be lowercased with [`str::to_lowercase`].
pub fn text_matches(item: &ContentItem, needle: &str) -> bool {
    item.title.to_lowercase().contains(needle) || item.raw_content.to_lowercase().contains(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{from_millis, ContentType};

    fn item(title: &str, body: &str) -> ContentItem {
        ContentItem {
            id: 1,
            url: "https://example.com".into(),
            title: title.into(),
            content_type: ContentType::Article,
            raw_content: body.into(),
            ai_analysis: None,
            owner_id: "u1".into(),
            created_at: from_millis(0),
            updated_at: from_millis(0),
        }
    }

    #[test]
    fn matching_folds_non_ascii_case() {
        let it = item("ÉCOLE Notes", "Über alles");
        assert!(text_matches(&it, &"école".to_lowercase()));
        assert!(text_matches(&it, &"ÜBER".to_lowercase()));
        assert!(!text_matches(&it, "absent"));
    }
}
