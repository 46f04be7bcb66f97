//! Core data models used throughout ThoughtSynth.
//!
//! These types represent the content items, analyses, takeaways, tags, and
//! chat records that flow through the ingestion and discussion pipeline.
//! All of them serialize with camelCase field names, which is the shape the
//! HTTP API and the realtime socket frames expose.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media a submitted URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Article,
    Podcast,
    Video,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Article => "article",
            ContentType::Podcast => "podcast",
            ContentType::Video => "video",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "article" => Ok(ContentType::Article),
            "podcast" => Ok(ContentType::Podcast),
            "video" => Ok(ContentType::Video),
            other => anyhow::bail!("unknown content type: '{}'", other),
        }
    }
}

/// Structured AI analysis embedded in a [`ContentItem`].
///
/// Every list field is always present; a provider response that omits or
/// malforms one yields an empty list (see [`crate::analysis`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Analysis {
    pub summary: String,
    pub core_concepts: Vec<String>,
    pub key_insights: Vec<String>,
    pub notable_quotes: Vec<String>,
    pub related_topics: Vec<String>,
    pub actionable_takeaways: Vec<String>,
    pub tags: Vec<String>,
}

/// A user-submitted URL plus its extracted text and AI analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub content_type: ContentType,
    pub raw_content: String,
    pub ai_analysis: Option<Analysis>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for [`ContentItem`]; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewContentItem {
    pub url: String,
    pub title: String,
    pub content_type: ContentType,
    pub raw_content: String,
    pub ai_analysis: Option<Analysis>,
    pub owner_id: String,
}

/// Partial update for a content item. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUpdate {
    pub title: Option<String>,
    pub raw_content: Option<String>,
}

impl ContentUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.raw_content.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Takeaway {
    pub id: i64,
    pub content_item_id: i64,
    pub owner_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether a tag came from the analysis or was added by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Auto,
    Manual,
}

impl TagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::Auto => "auto",
            TagKind::Manual => "manual",
        }
    }
}

impl FromStr for TagKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(TagKind::Auto),
            "manual" => Ok(TagKind::Manual),
            other => anyhow::bail!("unknown tag kind: '{}'", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub content_item_id: i64,
    pub name: String,
    pub kind: TagKind,
    pub created_at: DateTime<Utc>,
}

/// The single chat conversation attached to a content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatThread {
    pub id: i64,
    pub content_item_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    User,
    Ai,
}

impl SenderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderKind::User => "user",
            SenderKind::Ai => "ai",
        }
    }
}

impl FromStr for SenderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(SenderKind::User),
            "ai" => Ok(SenderKind::Ai),
            other => anyhow::bail!("unknown sender kind: '{}'", other),
        }
    }
}

/// Display name attached to every AI-authored message.
pub const AI_SENDER_NAME: &str = "AI Assistant";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub thread_id: i64,
    pub sender_kind: SenderKind,
    pub sender_id: Option<String>,
    pub sender_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`ChatMessage`].
///
/// Only constructible through [`NewChatMessage::user`] and
/// [`NewChatMessage::ai`], so `sender_id` is `None` exactly when the
/// sender is the AI.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    thread_id: i64,
    sender_kind: SenderKind,
    sender_id: Option<String>,
    sender_name: String,
    text: String,
}

impl NewChatMessage {
    pub fn user(
        thread_id: i64,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            thread_id,
            sender_kind: SenderKind::User,
            sender_id: Some(sender_id.into()),
            sender_name: sender_name.into(),
            text: text.into(),
        }
    }

    pub fn ai(thread_id: i64, text: impl Into<String>) -> Self {
        Self {
            thread_id,
            sender_kind: SenderKind::Ai,
            sender_id: None,
            sender_name: AI_SENDER_NAME.to_string(),
            text: text.into(),
        }
    }

    pub fn thread_id(&self) -> i64 {
        self.thread_id
    }

    pub fn sender_kind(&self) -> SenderKind {
        self.sender_kind
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.sender_id.as_deref()
    }

    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Materialize the stored record once the store has assigned an id.
    pub fn into_message(self, id: i64, created_at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id,
            thread_id: self.thread_id,
            sender_kind: self.sender_kind,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            text: self.text,
            created_at,
        }
    }
}

/// Convert epoch milliseconds (the persisted form) back to a UTC timestamp.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Current time truncated to the millisecond precision stores persist.
pub fn now_millis() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_round_trips_through_str() {
        for ct in [ContentType::Article, ContentType::Podcast, ContentType::Video] {
            assert_eq!(ct.as_str().parse::<ContentType>().unwrap(), ct);
        }
        assert!("book".parse::<ContentType>().is_err());
    }

    #[test]
    fn ai_message_has_no_sender_id() {
        let msg = NewChatMessage::ai(7, "hello");
        assert_eq!(msg.sender_kind(), SenderKind::Ai);
        assert!(msg.sender_id().is_none());
        assert_eq!(msg.sender_name(), AI_SENDER_NAME);

        let user = NewChatMessage::user(7, "u1", "Ada", "hi");
        assert_eq!(user.sender_id(), Some("u1"));
    }

    #[test]
    fn analysis_serializes_camel_case() {
        let analysis = Analysis {
            summary: "s".into(),
            core_concepts: vec!["c".into()],
            ..Default::default()
        };
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["coreConcepts"][0], "c");
        assert!(json["actionableTakeaways"].as_array().unwrap().is_empty());
    }

    #[test]
    fn chat_message_serializes_camel_case() {
        let msg = NewChatMessage::ai(1, "reply").into_message(3, from_millis(0));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["senderKind"], "ai");
        assert!(json["senderId"].is_null());
        assert_eq!(json["senderName"], "AI Assistant");
    }
}
