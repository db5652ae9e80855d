//! Paper RAG Library
//!
//! A paper-aware PDF ingestion and hybrid retrieval-augmented question answering
//! system. It integrates:
//! - Ollama for language model and dense embedding generation
//! - A hybrid dense+sparse (BM25) vector index for retrieval
//! - Structural analysis and hierarchical chunking of academic PDFs
//! - Session-scoped retrieval coordinated through an external state store
//!
//! # Example
//!
//! ```rust,no_run
//! use paper_rag::{RagConfig, RagContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RagConfig::default();
//!     let ctx = RagContext::new(config).await?;
//!     let deps = ctx.ingest_deps().await;
//!     let outcome = paper_rag::paper::ingest::ingest(&deps.deps(), &[], "paper.pdf", None).await?;
//!     println!("ingested {} chunks", outcome.chunks_count);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod paper;
pub mod rerank;

pub use cache::{CacheStats, LlmCache, LlmCacheConfig};
pub use config::{AnsweringConfig, ChunkingConfig, ExternalRegistryConfig, IndexConfig, LlmConfig, RagConfig, RerankerConfig, StorageConfig};
pub use error::{AgentError, LlmError, MemoryError, PaperError, Result};
pub use llm::{LlmClient, OllamaClient};
pub use memory::{Filter, HybridSearchResult, SqliteVectorIndex, VectorIndex, VectorRecord};
pub use paper::context::RagContext;
pub use rerank::{HttpReranker, NoopReranker, Reranker};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
