//! Core data model: paper identity, chunks, ingestion records, session state,
//! and chat metadata (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A metadata value restricted to the Pinecone-compatible value set (spec.md §3, §6):
/// string, integer, float, bool, or list-of-strings. Nested maps are not representable
/// here by construction — they must be flattened to `Str` before insertion, which is
/// what [`crate::paper::sanitize::stringify_nested`] is for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            MetadataValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Str(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        MetadataValue::List(value)
    }
}

/// Convenience alias for a chunk/record metadata map.
pub type Metadata = HashMap<String, MetadataValue>;

/// The kind of chunk emitted by the hierarchical chunker (spec.md §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Content,
    SectionContent,
    Figure,
    Table,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Content => "content",
            ChunkType::SectionContent => "section_content",
            ChunkType::Figure => "figure",
            ChunkType::Table => "table",
        }
    }
}

/// A figure or table caption detected by the structural analyzer (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureTable {
    pub kind: FigureTableKind,
    pub label: String,
    pub caption: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FigureTableKind {
    Figure,
    Table,
}

impl FigureTableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FigureTableKind::Figure => "figure",
            FigureTableKind::Table => "table",
        }
    }
}

/// A detected section heading and the line on which it starts (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedSection {
    pub name: String,
    pub start_line: usize,
}

/// Paper identity and bibliographic metadata (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: String,
    pub arxiv_id: Option<String>,
    pub abstract_text: String,
    pub categories: Vec<String>,
}

/// One textual fragment produced by the chunker, the unit of retrieval (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    pub source: String,
    pub page: i64,
    pub section: Option<String>,
    pub subsection: Option<String>,
    pub chunk_type: ChunkType,
    pub citations: Vec<String>,
    pub figures_tables: Vec<FigureTable>,
    pub paper: PaperMetadata,
    pub figure_label: Option<String>,
}

impl Chunk {
    /// Build the Pinecone-compatible metadata map for this chunk (spec.md §3's
    /// invariant that `metadata["text"]` and `metadata["text_content"]` mirror the
    /// chunk text).
    pub fn metadata(&self) -> Metadata {
        let mut m: Metadata = HashMap::new();
        m.insert("source".into(), self.source.clone().into());
        m.insert("page".into(), MetadataValue::Int(self.page));
        if let Some(section) = &self.section {
            m.insert("section".into(), section.clone().into());
        }
        if let Some(subsection) = &self.subsection {
            m.insert("subsection".into(), subsection.clone().into());
        }
        m.insert("chunk_type".into(), self.chunk_type.as_str().into());
        if !self.citations.is_empty() {
            m.insert("citations".into(), self.citations.clone().into());
        }
        if !self.figures_tables.is_empty() {
            let labels: Vec<String> = self
                .figures_tables
                .iter()
                .map(|ft| format!("{}: {}", ft.kind.as_str(), ft.label))
                .collect();
            m.insert("figures_tables".into(), labels.into());
        }
        m.insert("paper_id".into(), self.paper.paper_id.clone().into());
        m.insert("title".into(), self.paper.title.clone().into());
        if let Some(year) = self.paper.year {
            m.insert("year".into(), MetadataValue::Int(year as i64));
        }
        m.insert("venue".into(), self.paper.venue.clone().into());
        if let Some(label) = &self.figure_label {
            m.insert("figure_label".into(), label.clone().into());
        }
        m.insert("text".into(), self.text.clone().into());
        m.insert("text_content".into(), self.text.clone().into());
        m
    }
}

/// Per-document ingestion lifecycle state (spec.md §3, owned by C10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    /// The state machine from spec.md §3: `pending -> processing -> {completed, failed}`;
    /// `failed -> processing` is allowed (retry); `completed` is terminal.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
        )
    }
}

/// One ingestion record, one per `paper_id` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub paper_id: String,
    pub file_name: String,
    pub file_path: String,
    pub chunks_count: usize,
    pub vector_store_ids: Vec<String>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
}

impl IngestionRecord {
    pub fn new_pending(
        paper_id: impl Into<String>,
        file_name: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            paper_id: paper_id.into(),
            file_name: file_name.into(),
            file_path: file_path.into(),
            chunks_count: 0,
            vector_store_ids: Vec::new(),
            processing_status: ProcessingStatus::Pending,
            processing_error: None,
        }
    }
}

/// Per-session RAG enable/disable state (spec.md §3, owned by C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRagState {
    pub session_id: String,
    pub is_rag_enabled: bool,
    pub enabled_by: Option<String>,
    pub enabled_at: Option<DateTime<Utc>>,
}

impl SessionRagState {
    pub fn disabled(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            is_rag_enabled: false,
            enabled_by: None,
            enabled_at: None,
        }
    }
}

/// Append-only chat metadata record, one per AI-answered message (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMetadata {
    pub message_id: String,
    pub session_id: String,
    pub used_rag: bool,
    pub sources_used: Vec<String>,
    pub chunks_retrieved: usize,
    pub processing_time_ms: u64,
    pub model_used: String,
}
