//! Content ingestion pipeline.
//!
//! `classify → extract → analyze → persist item → tags → takeaway → thread →
//! index`. The writes after the item insert are independent and sequential:
//! if one fails the item stays, without whatever came after it. Vector
//! indexing is best-effort and never fails the pipeline.
//!
//! [`process_content`] is the total entry point used by the HTTP layer and
//! the CLI: every failure becomes a `success: false` outcome.

use serde::Serialize;
use thiserror::Error;

use thoughtsynth_core::models::{ContentItem, NewContentItem, TagKind};

use crate::analyzer::AnalysisError;
use crate::app::AppContext;
use crate::extract::{classify, ExtractError};

#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub url: String,
    /// Free-text notes from the submitter. Fed to the analyzer and stored
    /// as the item's first takeaway.
    pub user_takeaways: Option<String>,
    pub owner_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub content_item: Option<ContentItem>,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Run the pipeline, propagating the first failure.
pub async fn ingest(ctx: &AppContext, request: &ProcessRequest) -> Result<ContentItem, IngestError> {
    let notes = request
        .user_takeaways
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let content_type = classify(&request.url)?;
    let extracted = ctx.extractor.extract(&request.url, content_type).await?;
    let analysis = ctx
        .analyzer
        .analyze(&extracted.title, &extracted.body, notes)
        .await?;

    let item = ctx
        .store
        .create_content_item(&NewContentItem {
            url: request.url.clone(),
            title: extracted.title,
            content_type,
            raw_content: extracted.body,
            ai_analysis: Some(analysis.clone()),
            owner_id: request.owner_id.clone(),
        })
        .await?;
    tracing::info!(
        content_id = item.id,
        url = %item.url,
        %content_type,
        live = ctx.analyzer.is_live(),
        "stored content item"
    );

    for tag in &analysis.tags {
        ctx.store.create_tag(item.id, tag, TagKind::Auto).await?;
    }

    let takeaway = match notes {
        Some(text) => Some(
            ctx.store
                .create_takeaway(item.id, &request.owner_id, text)
                .await?,
        ),
        None => None,
    };

    ctx.store.get_or_create_thread(item.id).await?;

    ctx.indexer.index_content(&item).await;
    if let Some(takeaway) = &takeaway {
        ctx.indexer.index_takeaway(&item, takeaway).await;
    }

    Ok(item)
}

/// Run the pipeline and fold the result into a response payload.
pub async fn process_content(ctx: &AppContext, request: &ProcessRequest) -> ProcessOutcome {
    match ingest(ctx, request).await {
        Ok(item) => ProcessOutcome {
            content_item: Some(item),
            success: true,
            message: "Content processed successfully".to_string(),
        },
        Err(e) => {
            tracing::error!(url = %request.url, error = %e, "failed to process content");
            ProcessOutcome {
                content_item: None,
                success: false,
                message: format!("Failed to process content: {}", e),
            }
        }
    }
}
