//! Configuration management for the paper RAG service

use crate::cache::LlmCacheConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level configuration, aggregating every subsystem's settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// LLM/embedding provider configuration
    pub llm: LlmConfig,

    /// Vector index configuration
    pub index: IndexConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Answering engine configuration
    #[serde(default)]
    pub answering: AnsweringConfig,

    /// Reranker configuration
    #[serde(default)]
    pub reranker: RerankerConfig,

    /// External registry (state store) configuration
    pub registry: ExternalRegistryConfig,

    /// Filesystem layout configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Language model / embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama-compatible server URL
    pub ollama_url: String,

    /// Default model for text generation
    pub text_model: String,

    /// Model for dense embeddings
    pub embedding_model: String,

    /// Maximum tokens for generation (spec.md §6: `max_tokens`, default 32000)
    pub max_tokens: u32,

    /// Temperature for generation (spec.md §6: `temperature`, default 0.2)
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Enable streaming responses
    pub stream: bool,

    /// Task-specific model configurations
    #[serde(default)]
    pub task_models: HashMap<String, TaskModelConfig>,

    /// LLM response cache configuration
    #[serde(default)]
    pub cache: LlmCacheConfig,
}

/// Task-specific model configuration (kept from the teacher for extensibility).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskModelConfig {
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Vector index configuration (spec.md §6's enumerated knobs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index name
    pub index_name: String,

    /// Database URL backing the index (SQLite in this implementation)
    pub database_url: Option<String>,

    /// Dense embedding dimension (spec.md: typ. 1024)
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Distance metric; the core only supports dot-product
    #[serde(default = "default_metric")]
    pub metric: String,

    /// Upsert batch size
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Default top_k for retrieval
    #[serde(default = "default_top_k")]
    pub top_k_default: usize,

    /// Hybrid mixing parameter (0 = pure dense, 1 = pure sparse)
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f32,
}

fn default_embedding_dim() -> usize {
    1024
}
fn default_metric() -> String {
    "dotproduct".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_top_k() -> usize {
    20
}
fn default_hybrid_alpha() -> f32 {
    0.5
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_name: "papers".to_string(),
            database_url: Some("sqlite://paper_rag_index.db".to_string()),
            embedding_dim: default_embedding_dim(),
            metric: default_metric(),
            batch_size: default_batch_size(),
            top_k_default: default_top_k(),
            hybrid_alpha: default_hybrid_alpha(),
        }
    }
}

/// Chunking thresholds (spec.md §4.2 / §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size_default: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap_default: usize,
    #[serde(default = "default_section_split_threshold")]
    pub section_split_threshold: usize,
    #[serde(default = "default_section_split_size")]
    pub section_split_size: usize,
    #[serde(default = "default_section_split_overlap")]
    pub section_split_overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_section_split_threshold() -> usize {
    1200
}
fn default_section_split_size() -> usize {
    800
}
fn default_section_split_overlap() -> usize {
    150
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_default: default_chunk_size(),
            chunk_overlap_default: default_chunk_overlap(),
            section_split_threshold: default_section_split_threshold(),
            section_split_size: default_section_split_size(),
            section_split_overlap: default_section_split_overlap(),
        }
    }
}

/// Answering engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnsweringConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_sources_returned")]
    pub sources_returned: usize,
    #[serde(default = "default_source_snippet_len")]
    pub source_snippet_len: usize,
}

fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    32000
}
fn default_sources_returned() -> usize {
    5
}
fn default_source_snippet_len() -> usize {
    500
}

impl Default for AnsweringConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            sources_returned: default_sources_returned(),
            source_snippet_len: default_source_snippet_len(),
        }
    }
}

/// Reranker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Whether a rerank HTTP endpoint is configured; `None` uses the no-op reranker.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_rerank_timeout")]
    pub timeout: u64,
}

fn default_rerank_timeout() -> u64 {
    30
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            api_key: None,
            timeout: default_rerank_timeout(),
        }
    }
}

/// External registry (state store) configuration (spec.md §6.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRegistryConfig {
    pub base_url: String,
    #[serde(default)]
    pub internal_service_header: Option<String>,
    #[serde(default = "default_registry_timeout")]
    pub timeout: u64,
}

fn default_registry_timeout() -> u64 {
    30
}

/// Filesystem layout configuration (spec.md §6: "Persisted filesystem layout").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: String,
}

fn default_input_dir() -> String {
    "input".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            index: IndexConfig::default(),
            chunking: ChunkingConfig::default(),
            answering: AnsweringConfig::default(),
            reranker: RerankerConfig::default(),
            registry: ExternalRegistryConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            text_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            max_tokens: 32000,
            temperature: 0.2,
            timeout: 60,
            stream: false,
            task_models: HashMap::new(),
            cache: LlmCacheConfig::default(),
        }
    }
}

impl Default for ExternalRegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            internal_service_header: None,
            timeout: default_registry_timeout(),
        }
    }
}

impl LlmConfig {
    /// Get the appropriate model configuration for a given task.
    pub fn get_task_model(&self, task: &str) -> TaskModelConfig {
        if let Some(task_config) = self.task_models.get(task) {
            return task_config.clone();
        }

        let task_lower = task.to_lowercase();
        for config in self.task_models.values() {
            for keyword in &config.keywords {
                if task_lower.contains(&keyword.to_lowercase()) {
                    return config.clone();
                }
            }
        }

        TaskModelConfig {
            model: self.text_model.clone(),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            system_prompt: None,
            keywords: vec![],
        }
    }
}

impl RagConfig {
    /// Load configuration from a file; format is inferred from the extension.
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yml::from_str(&content)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        Ok(config)
    }

    /// Save configuration to a file; format is inferred from the extension.
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string(self)?,
            Some("yaml") | Some("yml") => serde_yml::to_string(self)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration, surfacing `config-missing` (spec.md §7) as an error.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.llm.ollama_url.starts_with("http") {
            return Err(anyhow::anyhow!(
                "Invalid LLM provider URL: {}",
                self.llm.ollama_url
            ));
        }
        if self.llm.text_model.is_empty() {
            return Err(anyhow::anyhow!("Text model name cannot be empty"));
        }
        if self.llm.embedding_model.is_empty() {
            return Err(anyhow::anyhow!("Embedding model name cannot be empty"));
        }
        if self.index.embedding_dim == 0 {
            return Err(anyhow::anyhow!("embedding_dim must be positive"));
        }
        if !(0.0..=1.0).contains(&self.index.hybrid_alpha) {
            return Err(anyhow::anyhow!("hybrid_alpha must be between 0.0 and 1.0"));
        }
        if self.index.batch_size == 0 {
            return Err(anyhow::anyhow!("batch_size must be positive"));
        }
        if self.chunking.section_split_threshold < self.chunking.section_split_size {
            return Err(anyhow::anyhow!(
                "section_split_threshold must be >= section_split_size"
            ));
        }
        if self.registry.base_url.is_empty() {
            return Err(anyhow::anyhow!("registry base_url cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_llm_url_rejected() {
        let mut config = RagConfig::default();
        config.llm.ollama_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_hybrid_alpha_rejected() {
        let mut config = RagConfig::default();
        config.index.hybrid_alpha = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_task_model_keyword_match() {
        let mut config = LlmConfig::default();
        config.task_models.insert(
            "summarize".to_string(),
            TaskModelConfig {
                model: "llama3.2:summarizer".to_string(),
                max_tokens: Some(512),
                temperature: Some(0.1),
                system_prompt: None,
                keywords: vec!["summary".to_string()],
            },
        );

        let resolved = config.get_task_model("write a summary of this paper");
        assert_eq!(resolved.model, "llama3.2:summarizer");
    }

    #[test]
    fn test_round_trip_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = RagConfig::default();
        config.to_file(&path).unwrap();
        let loaded = RagConfig::from_file(&path).unwrap();
        assert_eq!(loaded.index.embedding_dim, config.index.embedding_dim);
    }
}
