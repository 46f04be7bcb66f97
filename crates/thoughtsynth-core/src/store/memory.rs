//! In-memory [`Store`] implementation for tests and ephemeral runs.
//!
//! All tables live in one [`Inner`] behind a single `std::sync::RwLock`, so
//! find-or-insert on threads and the cascading delete are each one critical
//! section.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{
    now_millis, ChatMessage, ChatThread, ContentItem, ContentUpdate, NewChatMessage,
    NewContentItem, Tag, TagKind, Takeaway,
};

use super::{text_matches, Store};

#[derive(Default)]
struct Inner {
    next_id: i64,
    items: Vec<ContentItem>,
    takeaways: Vec<Takeaway>,
    tags: Vec<Tag>,
    threads: Vec<ChatThread>,
    messages: Vec<ChatMessage>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory store; ids come from one shared counter.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| anyhow!("store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| anyhow!("store lock poisoned"))
    }
}

fn newest_first(items: &mut [ContentItem]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

fn clamp_limit(limit: i64) -> usize {
    limit.max(0) as usize
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_content_item(&self, item: &NewContentItem) -> Result<ContentItem> {
        let mut inner = self.write()?;
        let now = now_millis();
        let stored = ContentItem {
            id: inner.next_id(),
            url: item.url.clone(),
            title: item.title.clone(),
            content_type: item.content_type,
            raw_content: item.raw_content.clone(),
            ai_analysis: item.ai_analysis.clone(),
            owner_id: item.owner_id.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.items.push(stored.clone());
        Ok(stored)
    }

    async fn get_content_item(&self, id: i64) -> Result<Option<ContentItem>> {
        Ok(self.read()?.items.iter().find(|i| i.id == id).cloned())
    }

    async fn list_content_items(&self, owner_id: &str, limit: i64) -> Result<Vec<ContentItem>> {
        let mut items: Vec<ContentItem> = self
            .read()?
            .items
            .iter()
            .filter(|i| i.owner_id == owner_id)
            .cloned()
            .collect();
        newest_first(&mut items);
        items.truncate(clamp_limit(limit));
        Ok(items)
    }

    async fn update_content_item(
        &self,
        id: i64,
        update: &ContentUpdate,
    ) -> Result<Option<ContentItem>> {
        let mut inner = self.write()?;
        let Some(item) = inner.items.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };
        if let Some(title) = &update.title {
            item.title = title.clone();
        }
        if let Some(raw) = &update.raw_content {
            item.raw_content = raw.clone();
        }
        item.updated_at = now_millis();
        Ok(Some(item.clone()))
    }

    async fn delete_content_item(&self, id: i64) -> Result<bool> {
        let mut inner = self.write()?;
        let before = inner.items.len();
        inner.items.retain(|i| i.id != id);
        if inner.items.len() == before {
            return Ok(false);
        }
        inner.takeaways.retain(|t| t.content_item_id != id);
        inner.tags.retain(|t| t.content_item_id != id);
        let thread_ids: Vec<i64> = inner
            .threads
            .iter()
            .filter(|t| t.content_item_id == id)
            .map(|t| t.id)
            .collect();
        inner.threads.retain(|t| t.content_item_id != id);
        inner.messages.retain(|m| !thread_ids.contains(&m.thread_id));
        Ok(true)
    }

    async fn search_content_items(
        &self,
        owner_id: &str,
        query: &str,
        limit: i64,
    ) -> Result<Vec<ContentItem>> {
        let needle = query.to_lowercase();
        let mut items: Vec<ContentItem> = self
            .read()?
            .items
            .iter()
            .filter(|i| i.owner_id == owner_id)
            .filter(|i| text_matches(i, &needle))
            .cloned()
            .collect();
        newest_first(&mut items);
        items.truncate(clamp_limit(limit));
        Ok(items)
    }

    async fn create_takeaway(
        &self,
        content_item_id: i64,
        owner_id: &str,
        text: &str,
    ) -> Result<Takeaway> {
        let mut inner = self.write()?;
        if !inner.items.iter().any(|i| i.id == content_item_id) {
            bail!("content item {} does not exist", content_item_id);
        }
        let now = now_millis();
        let takeaway = Takeaway {
            id: inner.next_id(),
            content_item_id,
            owner_id: owner_id.to_string(),
            text: text.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.takeaways.push(takeaway.clone());
        Ok(takeaway)
    }

    async fn get_takeaway(&self, id: i64) -> Result<Option<Takeaway>> {
        Ok(self.read()?.takeaways.iter().find(|t| t.id == id).cloned())
    }

    async fn update_takeaway(&self, id: i64, text: &str) -> Result<Option<Takeaway>> {
        let mut inner = self.write()?;
        let Some(takeaway) = inner.takeaways.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        takeaway.text = text.to_string();
        takeaway.updated_at = now_millis();
        Ok(Some(takeaway.clone()))
    }

    async fn list_takeaways(&self, content_item_id: i64) -> Result<Vec<Takeaway>> {
        Ok(self
            .read()?
            .takeaways
            .iter()
            .filter(|t| t.content_item_id == content_item_id)
            .cloned()
            .collect())
    }

    async fn create_tag(&self, content_item_id: i64, name: &str, kind: TagKind) -> Result<Tag> {
        let mut inner = self.write()?;
        if !inner.items.iter().any(|i| i.id == content_item_id) {
            bail!("content item {} does not exist", content_item_id);
        }
        let tag = Tag {
            id: inner.next_id(),
            content_item_id,
            name: name.to_string(),
            kind,
            created_at: now_millis(),
        };
        inner.tags.push(tag.clone());
        Ok(tag)
    }

    async fn list_tags(&self, content_item_id: i64) -> Result<Vec<Tag>> {
        Ok(self
            .read()?
            .tags
            .iter()
            .filter(|t| t.content_item_id == content_item_id)
            .cloned()
            .collect())
    }

    async fn get_thread(&self, content_item_id: i64) -> Result<Option<ChatThread>> {
        Ok(self
            .read()?
            .threads
            .iter()
            .find(|t| t.content_item_id == content_item_id)
            .cloned())
    }

    async fn get_or_create_thread(&self, content_item_id: i64) -> Result<ChatThread> {
        let mut inner = self.write()?;
        if let Some(existing) = inner
            .threads
            .iter()
            .find(|t| t.content_item_id == content_item_id)
        {
            return Ok(existing.clone());
        }
        if !inner.items.iter().any(|i| i.id == content_item_id) {
            bail!("content item {} does not exist", content_item_id);
        }
        let thread = ChatThread {
            id: inner.next_id(),
            content_item_id,
            created_at: now_millis(),
        };
        inner.threads.push(thread.clone());
        Ok(thread)
    }

    async fn append_message(&self, message: NewChatMessage) -> Result<ChatMessage> {
        let mut inner = self.write()?;
        if !inner.threads.iter().any(|t| t.id == message.thread_id()) {
            bail!("chat thread {} does not exist", message.thread_id());
        }
        let id = inner.next_id();
        let stored = message.into_message(id, now_millis());
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, thread_id: i64) -> Result<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = self
            .read()?
            .messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }
}
