//! Keeps the vector index eventually consistent with the store.
//!
//! Writes and deletes are best-effort: every failure is logged and
//! swallowed, so an unreachable index never blocks ingestion or deletion.
//! Only [`Indexer::semantic_search`] propagates errors, since answering the
//! query is its whole purpose.

use std::sync::Arc;

use anyhow::{bail, Result};

use thoughtsynth_core::models::{ContentItem, Takeaway};
use thoughtsynth_core::vector::{
    content_vector_id, takeaway_vector_id, VectorFilter, VectorIndex, VectorKind, VectorMatch,
    VectorMetadata, VectorRecord,
};

use crate::embedding::Embedder;

pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    index: Option<Arc<dyn VectorIndex>>,
    delete_scan_limit: usize,
}

/// Text embedded for a content item: title, body, then the analysis.
pub fn content_embedding_text(item: &ContentItem) -> String {
    let (summary, insights) = item
        .ai_analysis
        .as_ref()
        .map(|a| (a.summary.as_str(), a.key_insights.join(", ")))
        .unwrap_or_default();
    format!(
        "{}\n\n{}\n\nSummary: {}\n\nKey Insights: {}",
        item.title, item.raw_content, summary, insights
    )
}

pub fn takeaway_embedding_text(item: &ContentItem, takeaway: &Takeaway) -> String {
    format!("{}\n\nUser Takeaway: {}", item.title, takeaway.text)
}

fn content_metadata(item: &ContentItem) -> VectorMetadata {
    VectorMetadata {
        content_id: item.id,
        kind: VectorKind::Content,
        owner_id: item.owner_id.clone(),
        title: item.title.clone(),
        url: Some(item.url.clone()),
        content_type: Some(item.content_type.to_string()),
        summary: item
            .ai_analysis
            .as_ref()
            .map(|a| a.summary.clone())
            .filter(|s| !s.is_empty()),
        tags: item
            .ai_analysis
            .as_ref()
            .map(|a| a.tags.clone())
            .unwrap_or_default(),
        takeaway_id: None,
        takeaway_text: None,
        created_at: item.created_at.to_rfc3339(),
    }
}

fn takeaway_metadata(item: &ContentItem, takeaway: &Takeaway) -> VectorMetadata {
    VectorMetadata {
        content_id: item.id,
        kind: VectorKind::Takeaway,
        owner_id: takeaway.owner_id.clone(),
        title: item.title.clone(),
        url: Some(item.url.clone()),
        content_type: Some(item.content_type.to_string()),
        summary: None,
        tags: Vec::new(),
        takeaway_id: Some(takeaway.id),
        takeaway_text: Some(takeaway.text.clone()),
        created_at: takeaway.created_at.to_rfc3339(),
    }
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Option<Arc<dyn VectorIndex>>,
        delete_scan_limit: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            delete_scan_limit,
        }
    }

    /// An indexer that does nothing.
    pub fn disabled() -> Self {
        Self::new(Arc::new(crate::embedding::DisabledEmbedder), None, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.index.is_some() && self.embedder.is_enabled()
    }

    fn active_index(&self) -> Option<&Arc<dyn VectorIndex>> {
        self.index.as_ref().filter(|_| self.embedder.is_enabled())
    }

    async fn upsert(&self, index: &dyn VectorIndex, id: String, text: &str, metadata: VectorMetadata) -> Result<()> {
        let values = self.embedder.embed(text).await?;
        index
            .upsert(&[VectorRecord {
                id,
                values,
                metadata,
            }])
            .await
    }

    pub async fn index_content(&self, item: &ContentItem) {
        let Some(index) = self.active_index() else {
            return;
        };
        let id = content_vector_id(item.id);
        let text = content_embedding_text(item);
        match self
            .upsert(index.as_ref(), id.clone(), &text, content_metadata(item))
            .await
        {
            Ok(()) => tracing::debug!(vector_id = %id, index = index.name(), "indexed content"),
            Err(e) => tracing::warn!(
                vector_id = %id,
                index = index.name(),
                error = %format!("{:#}", e),
                "failed to index content; continuing"
            ),
        }
    }

    pub async fn index_takeaway(&self, item: &ContentItem, takeaway: &Takeaway) {
        let Some(index) = self.active_index() else {
            return;
        };
        let id = takeaway_vector_id(takeaway.id);
        let text = takeaway_embedding_text(item, takeaway);
        if let Err(e) = self
            .upsert(
                index.as_ref(),
                id.clone(),
                &text,
                takeaway_metadata(item, takeaway),
            )
            .await
        {
            tracing::warn!(
                vector_id = %id,
                index = index.name(),
                error = %format!("{:#}", e),
                "failed to index takeaway; continuing"
            );
        }
    }

    /// Remove every vector tagged with `content_id`.
    ///
    /// The content vector id is always known. Derived takeaway vectors are
    /// located with a metadata-filtered query against an all-zero probe
    /// vector, since the index cannot delete by predicate.
    pub async fn delete_content_vectors(&self, content_id: i64) {
        let Some(index) = self.index.as_ref() else {
            return;
        };
        if let Err(e) = self.try_delete(index.as_ref(), content_id).await {
            tracing::warn!(
                content_id,
                index = index.name(),
                error = %format!("{:#}", e),
                "failed to delete content vectors; continuing"
            );
        }
    }

    async fn try_delete(&self, index: &dyn VectorIndex, content_id: i64) -> Result<()> {
        let dims = self.embedder.dims().max(1);
        let probe = vec![0.0f32; dims];
        let mut ids = vec![content_vector_id(content_id)];
        match index
            .query(&probe, &VectorFilter::content(content_id), self.delete_scan_limit)
            .await
        {
            Ok(matches) => ids.extend(matches.into_iter().map(|m| m.id)),
            Err(e) => tracing::warn!(
                content_id,
                error = %format!("{:#}", e),
                "could not list derived vectors; deleting the content vector only"
            ),
        }
        ids.sort();
        ids.dedup();
        index.delete_many(&ids).await?;
        tracing::debug!(content_id, deleted = ids.len(), "deleted content vectors");
        Ok(())
    }

    /// Owner-scoped similarity search.
    pub async fn semantic_search(
        &self,
        owner_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<VectorMatch>> {
        let Some(index) = self.active_index() else {
            bail!("semantic search requires an embedding provider and a vector index");
        };
        let vector = self.embedder.embed(query).await?;
        index
            .query(&vector, &VectorFilter::owner(owner_id), limit)
            .await
    }
}
