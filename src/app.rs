//! Service wiring.
//!
//! [`AppContext`] owns one instance of every collaborator (store, extractor,
//! analyzer, indexer, chat orchestrator) and is shared by the HTTP server and
//! the CLI commands. Strategy selection (live vs. degraded analyzer, enabled
//! vs. disabled indexer) happens once, here, at construction time.

use std::sync::Arc;

use anyhow::Result;

use thoughtsynth_core::store::memory::InMemoryStore;
use thoughtsynth_core::store::Store;
use thoughtsynth_core::vector::{InMemoryVectorIndex, VectorIndex};

use crate::analyzer::{create_analyzer, Analyzer};
use crate::chat::ChatOrchestrator;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::extract::Extractor;
use crate::indexer::Indexer;
use crate::migrate;
use crate::sqlite_store::SqliteStore;
use crate::vector_index::create_vector_index;

pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub extractor: Extractor,
    pub analyzer: Arc<dyn Analyzer>,
    pub indexer: Indexer,
    pub chat: ChatOrchestrator,
}

impl AppContext {
    /// Build every collaborator from `config`.
    ///
    /// With `memory = true` nothing touches disk: the store is an
    /// [`InMemoryStore`] and a `local` vector index lives in memory too.
    pub async fn from_config(config: &Config, memory: bool) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        if embedder.is_enabled() {
            tracing::info!(
                model = embedder.model_name(),
                dims = embedder.dims(),
                "embeddings enabled"
            );
        }

        let (store, index): (Arc<dyn Store>, Option<Arc<dyn VectorIndex>>) = if memory {
            let index: Option<Arc<dyn VectorIndex>> = match config.vector_index.provider.as_str() {
                "local" => Some(Arc::new(InMemoryVectorIndex::new())),
                _ => create_vector_index(&config.vector_index, None)?,
            };
            (Arc::new(InMemoryStore::new()), index)
        } else {
            migrate::run_migrations(config).await?;
            let pool = db::connect(config).await?;
            let index = create_vector_index(&config.vector_index, Some(&pool))?;
            (Arc::new(SqliteStore::new(pool)), index)
        };

        let indexer = Indexer::new(embedder, index, config.vector_index.delete_scan_limit);
        if !indexer.is_enabled() {
            tracing::info!("vector indexing disabled; semantic search unavailable");
        }

        Self::from_parts(config, store, create_analyzer(&config.llm)?, indexer)
    }

    /// Assemble a context from pre-built parts.
    pub fn from_parts(
        config: &Config,
        store: Arc<dyn Store>,
        analyzer: Arc<dyn Analyzer>,
        indexer: Indexer,
    ) -> Result<Self> {
        let chat = ChatOrchestrator::new(store.clone(), analyzer.clone());
        Ok(Self {
            config: Arc::new(config.clone()),
            extractor: Extractor::new(&config.extract)?,
            store,
            analyzer,
            indexer,
            chat,
        })
    }
}
