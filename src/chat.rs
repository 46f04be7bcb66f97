//! Per-content chat threads.
//!
//! Every content item has at most one thread. Posting a message (user or
//! AI) creates it on demand; listing never does, and returns an empty list
//! for an item nobody has talked about yet. Uniqueness under concurrent
//! first access is delegated to [`Store::get_or_create_thread`].

use std::sync::Arc;

use thiserror::Error;

use thoughtsynth_core::models::{ChatMessage, ChatThread, ContentItem, NewChatMessage};
use thoughtsynth_core::store::Store;

use crate::analyzer::{AnalysisError, Analyzer, ChatReplyRequest};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("content item {0} not found")]
    ContentNotFound(i64),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct ChatOrchestrator {
    store: Arc<dyn Store>,
    analyzer: Arc<dyn Analyzer>,
}

/// Summary handed to the model: the analysis summary, else the title.
fn content_summary(item: &ContentItem) -> &str {
    item.ai_analysis
        .as_ref()
        .map(|a| a.summary.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(item.title.as_str())
}

impl ChatOrchestrator {
    pub fn new(store: Arc<dyn Store>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self { store, analyzer }
    }

    async fn content(&self, content_id: i64) -> Result<ContentItem, ChatError> {
        self.store
            .get_content_item(content_id)
            .await?
            .ok_or(ChatError::ContentNotFound(content_id))
    }

    pub async fn get_or_create_thread(&self, content_id: i64) -> Result<ChatThread, ChatError> {
        self.content(content_id).await?;
        Ok(self.store.get_or_create_thread(content_id).await?)
    }

    pub async fn post_user_message(
        &self,
        content_id: i64,
        sender_id: &str,
        sender_name: &str,
        text: &str,
    ) -> Result<ChatMessage, ChatError> {
        let thread = self.get_or_create_thread(content_id).await?;
        let message = self
            .store
            .append_message(NewChatMessage::user(thread.id, sender_id, sender_name, text))
            .await?;
        tracing::debug!(content_id, thread_id = thread.id, message_id = message.id, "user message");
        Ok(message)
    }

    /// Ask the analyzer for a reply using the thread's full history, and
    /// store it as an AI message.
    pub async fn post_ai_message(
        &self,
        content_id: i64,
        requester_message: &str,
        extra_context: Option<&str>,
    ) -> Result<ChatMessage, ChatError> {
        let item = self.content(content_id).await?;
        let thread = self.store.get_or_create_thread(content_id).await?;
        let history = self.store.list_messages(thread.id).await?;

        let reply = self
            .analyzer
            .chat_reply(ChatReplyRequest {
                content_title: &item.title,
                content_summary: content_summary(&item),
                history: &history,
                new_message: requester_message,
                extra_context,
            })
            .await?;

        let message = self
            .store
            .append_message(NewChatMessage::ai(thread.id, reply))
            .await?;
        tracing::debug!(
            content_id,
            thread_id = thread.id,
            message_id = message.id,
            history = history.len(),
            live = self.analyzer.is_live(),
            "AI message"
        );
        Ok(message)
    }

    /// Messages in chronological order; empty if no thread exists yet.
    pub async fn list_messages(&self, content_id: i64) -> Result<Vec<ChatMessage>, ChatError> {
        match self.store.get_thread(content_id).await? {
            Some(thread) => Ok(self.store.list_messages(thread.id).await?),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::DegradedAnalyzer;
    use thoughtsynth_core::models::{Analysis, ContentType, NewContentItem, SenderKind};
    use thoughtsynth_core::store::memory::InMemoryStore;

    async fn setup() -> (ChatOrchestrator, Arc<InMemoryStore>, i64) {
        let store = Arc::new(InMemoryStore::new());
        let item = store
            .create_content_item(&NewContentItem {
                url: "https://example.com/article-x".into(),
                title: "Article X".into(),
                content_type: ContentType::Article,
                raw_content: "body".into(),
                ai_analysis: Some(Analysis::default()),
                owner_id: "u1".into(),
            })
            .await
            .unwrap();
        let chat = ChatOrchestrator::new(
            store.clone(),
            Arc::new(DegradedAnalyzer::new("ANTHROPIC_API_KEY")),
        );
        (chat, store, item.id)
    }

    #[tokio::test]
    async fn listing_does_not_create_a_thread() {
        let (chat, store, id) = setup().await;
        assert!(chat.list_messages(id).await.unwrap().is_empty());
        assert!(store.get_thread(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hello_then_ai_yields_two_messages() {
        let (chat, _store, id) = setup().await;
        chat.post_user_message(id, "u1", "Ada", "Hello").await.unwrap();
        let ai = chat.post_ai_message(id, "Hello", None).await.unwrap();
        assert!(ai.text.contains("\"Article X\""));

        let messages = chat.list_messages(id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender_kind, SenderKind::User);
        assert_eq!(messages[0].sender_id.as_deref(), Some("u1"));
        assert_eq!(messages[1].sender_kind, SenderKind::Ai);
        assert!(messages[1].sender_id.is_none());
        assert_eq!(messages[1].sender_name, "AI Assistant");
    }

    #[tokio::test]
    async fn missing_content_is_reported() {
        let (chat, _store, _) = setup().await;
        assert!(matches!(
            chat.post_ai_message(999, "hi", None).await,
            Err(ChatError::ContentNotFound(999))
        ));
        assert!(matches!(
            chat.post_user_message(999, "u1", "Ada", "hi").await,
            Err(ChatError::ContentNotFound(999))
        ));
    }

    #[test]
    fn summary_falls_back_to_title() {
        let mut item = ContentItem {
            id: 1,
            url: "u".into(),
            title: "Title".into(),
            content_type: ContentType::Article,
            raw_content: String::new(),
            ai_analysis: None,
            owner_id: "u1".into(),
            created_at: thoughtsynth_core::models::from_millis(0),
            updated_at: thoughtsynth_core::models::from_millis(0),
        };
        assert_eq!(content_summary(&item), "Title");
        item.ai_analysis = Some(Analysis {
            summary: "Short".into(),
            ..Default::default()
        });
        assert_eq!(content_summary(&item), "Short");
    }
}
