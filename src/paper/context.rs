//! Composition root (spec.md §5, §9): owns the process-wide singletons — dense/LLM
//! client, vector index handle, sparse encoder, reranker, external registry client,
//! and document registry — and wires them together for the ingestion and answering
//! call sites.

use crate::config::RagConfig;
use crate::error::Result;
use crate::llm::{LlmClient, OllamaClient};
use crate::memory::{SqliteVectorIndex, VectorIndex};
use crate::paper::bm25::Bm25Encoder;
use crate::paper::ingest::IngestDeps;
use crate::paper::registry::DocumentRegistry;
use crate::paper::registry_client::{ExternalRegistry, HttpExternalRegistry};
use crate::paper::session::SessionDeps;
use crate::rerank::{HttpReranker, NoopReranker, Reranker};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// The fully-wired runtime context a daemon or test harness hands to the paper RAG
/// operations. Each field is a process-wide singleton per spec.md §5; `vector_index`
/// is behind a lock so [`RagContext::reset_index`] can tear down and rebuild it.
pub struct RagContext {
    pub config: RagConfig,
    pub llm: Arc<dyn LlmClient>,
    pub vector_index: RwLock<Arc<dyn VectorIndex>>,
    pub bm25: Mutex<Bm25Encoder>,
    pub reranker: Arc<dyn Reranker>,
    pub external: Arc<dyn ExternalRegistry>,
    pub registry: DocumentRegistry,
}

impl RagContext {
    /// Build the context from configuration, initializing the vector index and
    /// choosing a reranker based on whether an endpoint is configured (spec.md §9).
    pub async fn new(config: RagConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| crate::error::AgentError::Config(e.to_string()))?;

        let llm: Arc<dyn LlmClient> = Arc::new(OllamaClient::new_with_cache(config.llm.clone()).await?);

        let mut index = SqliteVectorIndex::new(config.index.clone());
        index.initialize().await?;
        let vector_index: Arc<dyn VectorIndex> = Arc::new(index);

        let reranker: Arc<dyn Reranker> = match HttpReranker::new(&config.reranker)? {
            Some(http) => Arc::new(http),
            None => Arc::new(NoopReranker),
        };

        let external: Arc<dyn ExternalRegistry> = Arc::new(HttpExternalRegistry::new(&config.registry)?);

        info!("RagContext initialized");
        Ok(Self {
            config,
            llm,
            vector_index: RwLock::new(vector_index),
            bm25: Mutex::new(Bm25Encoder::new()),
            reranker,
            external,
            registry: DocumentRegistry::new(),
        })
    }

    /// Remove a previously-ingested document (spec.md §4.5, §8 scenario 2): deletes
    /// its chunks from the vector index and its record from the document registry.
    /// Returns the number of chunks removed.
    pub async fn remove_document(&self, paper_id: &str) -> Result<usize> {
        let record = self
            .registry
            .get(paper_id)
            .await
            .ok_or_else(|| crate::error::PaperError::NotFound(paper_id.to_string()))?;

        let vector_index = self.vector_index.read().await;
        let removed = crate::paper::ingest::remove_document(
            vector_index.as_ref(),
            self.config.index.embedding_dim,
            &record.file_path,
        )
        .await?;

        self.registry.remove(paper_id).await;
        Ok(removed)
    }

    /// Tear down and rebuild the vector index handle, clearing the BM25 fitted state
    /// so the next ingestion refits from scratch (spec.md §5: "teardown-on-index-recreation").
    pub async fn reset_index(&self) -> Result<()> {
        let mut index = SqliteVectorIndex::new(self.config.index.clone());
        index.initialize().await?;
        *self.vector_index.write().await = Arc::new(index);
        *self.bm25.lock().await = Bm25Encoder::new();
        info!("vector index reset");
        Ok(())
    }

    /// Build the borrowed dependency bundle [`ingest`] operations take. Callers hold
    /// the read lock on `vector_index` for the duration of the ingestion.
    pub async fn ingest_deps(&self) -> IngestDepsGuard<'_> {
        IngestDepsGuard {
            ctx: self,
            vector_index: self.vector_index.read().await,
        }
    }

    pub async fn session_deps(&self) -> SessionDepsGuard<'_> {
        SessionDepsGuard {
            ctx: self,
            vector_index: self.vector_index.read().await,
        }
    }
}

/// Holds the read guard on `vector_index` alive for the lifetime of an ingestion
/// call, exposing the borrowed [`IngestDeps`] the orchestrator needs.
pub struct IngestDepsGuard<'a> {
    ctx: &'a RagContext,
    vector_index: tokio::sync::RwLockReadGuard<'a, Arc<dyn VectorIndex>>,
}

impl<'a> IngestDepsGuard<'a> {
    pub fn deps(&self) -> IngestDeps<'_> {
        IngestDeps {
            config: &self.ctx.config,
            registry: &self.ctx.registry,
            vector_index: self.vector_index.as_ref(),
            llm: self.ctx.llm.as_ref(),
            bm25: &self.ctx.bm25,
        }
    }
}

pub struct SessionDepsGuard<'a> {
    ctx: &'a RagContext,
    vector_index: tokio::sync::RwLockReadGuard<'a, Arc<dyn VectorIndex>>,
}

impl<'a> SessionDepsGuard<'a> {
    pub fn deps(&self) -> SessionDeps<'_> {
        SessionDeps {
            config: &self.ctx.config,
            registry: &self.ctx.registry,
            vector_index: self.vector_index.as_ref(),
            llm: self.ctx.llm.as_ref(),
            bm25: &self.ctx.bm25,
            reranker: self.ctx.reranker.as_ref(),
            external: self.ctx.external.as_ref(),
        }
    }
}
