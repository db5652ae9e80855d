//! Paper-aware ingestion and retrieval system.
//!
//! This module provides functionality for:
//! - Detecting academic paper structure (sections, citations, figures/tables)
//! - Chunking documents section-aware for retrieval
//! - Sparse (BM25) encoding alongside dense embeddings
//! - Sanitizing metadata for the vector index boundary
//! - Orchestrating ingestion and per-session scoped question answering

pub mod analyzer;
pub mod answer;
pub mod bm25;
pub mod chunker;
pub mod context;
pub mod ingest;
pub mod registry;
pub mod registry_client;
pub mod sanitize;
pub mod session;
pub mod types;

pub use chunker::{chunk_document, Page};
pub use context::RagContext;
pub use ingest::remove_document;
pub use types::*;
