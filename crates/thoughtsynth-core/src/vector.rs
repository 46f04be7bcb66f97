//! Vector index abstraction.
//!
//! The vector index is a non-authoritative similarity side-store keyed by
//! string ids (`content-<id>`, `takeaway-<id>`). Records carry enough
//! metadata to answer owner-scoped searches and to locate every vector that
//! belongs to a content item without touching the relational store.
//!
//! Backends: [`InMemoryVectorIndex`] here, plus the SQLite and Pinecone
//! backends in the app crate.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::cosine_similarity;

/// What a vector was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorKind {
    Content,
    Takeaway,
}

impl VectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorKind::Content => "content",
            VectorKind::Takeaway => "takeaway",
        }
    }
}

/// Id of the vector for a content item's body + analysis.
pub fn content_vector_id(content_id: i64) -> String {
    format!("content-{}", content_id)
}

/// Id of the vector for a single takeaway.
pub fn takeaway_vector_id(takeaway_id: i64) -> String {
    format!("takeaway-{}", takeaway_id)
}

/// Metadata stored next to each vector.
///
/// Optional fields are omitted when serialized, since some hosted indexes
/// reject `null` metadata values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMetadata {
    pub content_id: i64,
    #[serde(rename = "type")]
    pub kind: VectorKind,
    pub owner_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub takeaway_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub takeaway_text: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// Equality filter over metadata. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorFilter {
    pub owner_id: Option<String>,
    pub content_id: Option<i64>,
    pub kind: Option<VectorKind>,
}

impl VectorFilter {
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            ..Default::default()
        }
    }

    pub fn content(content_id: i64) -> Self {
        Self {
            content_id: Some(content_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, meta: &VectorMetadata) -> bool {
        self.owner_id.as_deref().map_or(true, |o| o == meta.owner_id)
            && self.content_id.map_or(true, |c| c == meta.content_id)
            && self.kind.map_or(true, |k| k == meta.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// Abstract similarity index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or replace records by id |
/// | [`query`](VectorIndex::query) | Top-k cosine matches under a metadata filter |
/// | [`delete_many`](VectorIndex::delete_many) | Remove records by id; unknown ids are ignored |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name for logs (`"memory"`, `"local"`, `"pinecone"`).
    fn name(&self) -> &str;

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    async fn query(
        &self,
        vector: &[f32],
        filter: &VectorFilter,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>>;

    async fn delete_many(&self, ids: &[String]) -> Result<()>;
}

/// Rank `records` against `vector`, best first, keeping at most `top_k`.
pub fn rank_matches<'a>(
    vector: &[f32],
    records: impl Iterator<Item = (&'a str, &'a [f32], &'a VectorMetadata)>,
    filter: &VectorFilter,
    top_k: usize,
) -> Vec<VectorMatch> {
    let mut matches: Vec<VectorMatch> = records
        .filter(|(_, _, meta)| filter.matches(meta))
        .map(|(id, values, meta)| VectorMatch {
            id: id.to_string(),
            score: cosine_similarity(vector, values),
            metadata: meta.clone(),
        })
        .collect();
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(top_k);
    matches
}

/// Brute-force in-memory index for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records
            .read()
            .map(|r| r.iter().any(|rec| rec.id == id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;
        for record in records {
            stored.retain(|r| r.id != record.id);
            stored.push(record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &VectorFilter,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let stored = self
            .records
            .read()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;
        Ok(rank_matches(
            vector,
            stored
                .iter()
                .map(|r| (r.id.as_str(), r.values.as_slice(), &r.metadata)),
            filter,
            top_k,
        ))
    }

    async fn delete_many(&self, ids: &[String]) -> Result<()> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow!("vector index lock poisoned"))?;
        stored.retain(|r| !ids.contains(&r.id));
        Ok(())
    }
}
