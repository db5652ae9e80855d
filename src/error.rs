//! Error handling for the paper RAG service

use thiserror::Error;

/// Result type alias for the paper RAG service
pub type Result<T> = std::result::Result<T, AgentError>;

/// Main error type for the paper RAG service
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Paper error: {0}")]
    Paper(#[from] PaperError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Errors named by spec.md §7's taxonomy that are not already covered by
/// `LlmError`/`MemoryError` (provider-transient, provider-incapable kinds reuse those).
#[derive(Error, Debug)]
pub enum PaperError {
    /// input-invalid: non-PDF upload, missing question, absent paper_id.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// config-missing: required credential/URL unset.
    #[error("missing configuration: {0}")]
    ConfigMissing(String),

    /// ingest-failed: unrecoverable failure during ingestion (spec.md §4.5).
    #[error("ingestion failed: {0}")]
    IngestFailed(String),

    /// scope-empty: session RAG disabled or has no completed papers; carries the
    /// fixed user-visible message, not surfaced as an error to end users.
    #[error("{0}")]
    ScopeEmpty(String),

    /// not-found: paper or session unknown in the external registry.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors related to language model operations
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout: operation took too long")]
    Timeout,

    #[error("All providers failed")]
    AllProvidersFailed,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Errors related to memory/vector store operations
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Store not initialized")]
    NotInitialized,

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Storage failed: {0}")]
    StorageFailed(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),
}

impl AgentError {
    /// Check if the error is retryable (spec.md §7: provider-transient, retried up to twice).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Llm(LlmError::Timeout)
                | AgentError::Llm(LlmError::ConnectionFailed(_))
                | AgentError::Http(_)
        )
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            AgentError::Llm(_) => "llm",
            AgentError::Memory(_) => "memory",
            AgentError::Paper(_) => "paper",
            AgentError::Config(_) => "config",
            AgentError::Io(_) => "io",
            AgentError::Serialization(_) => "serialization",
            AgentError::Http(_) => "http",
            AgentError::Database(_) => "database",
            AgentError::Generic(_) => "generic",
            AgentError::Network(_) => "network",
            AgentError::NotFound(_) => "not_found",
        }
    }
}
