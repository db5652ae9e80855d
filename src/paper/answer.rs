//! Answering Engine (C8): retrieves, reranks, and prompts over paper chunks to
//! produce a grounded answer with citations back to source sections (spec.md §4.7).

use crate::config::{AnsweringConfig, IndexConfig};
use crate::error::Result;
use crate::llm::{system_message, user_message, LlmClient};
use crate::memory::{Filter, HybridSearchResult, VectorIndex};
use crate::paper::bm25::Bm25Encoder;
use crate::rerank::Reranker;
use std::collections::HashSet;
use tokio::sync::Mutex;

const PROMPT_PREAMBLE: &str = "You are a research assistant answering questions about academic papers. \
Use only the provided context to answer. When you use a fact from the context, cite the section it came \
from in square brackets, e.g. [Section: Introduction]. Reproduce any citation strings from the context \
verbatim. When the context references a figure or table, refer to it by its label. If the context does \
not contain enough information to answer, say so plainly and do not fabricate an answer.";

/// One cited source attached to an answer (spec.md §4.7's top-5 post-rerank list).
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnswerSource {
    pub rank: usize,
    pub content: String,
    pub section: Option<String>,
    pub subsection: Option<String>,
    pub citations: Vec<String>,
    pub paper_id: Option<String>,
    pub title: Option<String>,
    pub chunk_type: Option<String>,
    pub relevance_score: f32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AnswerMetadata {
    pub total_sources: usize,
    pub model_used: String,
    pub reranked: bool,
    pub sections_referenced: Vec<String>,
    pub citations_found: Vec<String>,
    pub papers_referenced: Vec<String>,
    pub research_paper_aware: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<AnswerSource>,
    pub metadata: AnswerMetadata,
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}

fn build_prompt(question: &str, hits: &[HybridSearchResult]) -> Vec<crate::llm::Message> {
    let context = hits
        .iter()
        .map(|h| {
            h.metadata
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    vec![
        system_message(PROMPT_PREAMBLE),
        user_message(format!("Context:\n{context}\n\nQuestion: {question}")),
    ]
}

fn hits_to_sources(hits: &[HybridSearchResult], limit: usize) -> Vec<AnswerSource> {
    hits.iter()
        .take(limit)
        .enumerate()
        .map(|(i, h)| AnswerSource {
            rank: i + 1,
            content: truncate(
                h.metadata.get("text").and_then(|v| v.as_str()).unwrap_or(""),
                500,
            ),
            section: h.metadata.get("section").and_then(|v| v.as_str()).map(String::from),
            subsection: h.metadata.get("subsection").and_then(|v| v.as_str()).map(String::from),
            citations: h
                .metadata
                .get("citations")
                .and_then(|v| v.as_list())
                .map(|l| l.to_vec())
                .unwrap_or_default(),
            paper_id: h.metadata.get("paper_id").and_then(|v| v.as_str()).map(String::from),
            title: h.metadata.get("title").and_then(|v| v.as_str()).map(String::from),
            chunk_type: h.metadata.get("chunk_type").and_then(|v| v.as_str()).map(String::from),
            relevance_score: h.score,
        })
        .collect()
}

/// Summarize over *all* retrieved sources, not just the truncated display list
/// (spec.md §4.7 step 6: "deduplicated unions over all retrieved documents").
fn summarize_sources(sources: &[AnswerSource]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut sections = HashSet::new();
    let mut citations = HashSet::new();
    let mut papers = HashSet::new();
    for s in sources {
        if let Some(section) = &s.section {
            sections.insert(section.clone());
        }
        for c in &s.citations {
            citations.insert(c.clone());
        }
        if let Some(p) = &s.paper_id {
            papers.insert(p.clone());
        }
    }
    (
        sections.into_iter().collect(),
        citations.into_iter().collect(),
        papers.into_iter().collect(),
    )
}

/// `ask(question, top_k?, filter?)` (spec.md §4.7): hybrid retrieve, rerank with
/// fallback, prompt, and shape the response.
///
/// `force_dense_only`, when set, skips the BM25 sparse query and runs the
/// retrieval at `alpha=0.0` (pure dense), overriding `index_config.hybrid_alpha` —
/// the scoped, session-restricted path (spec.md §4.8) asks for exactly this.
pub async fn ask(
    vector_index: &dyn VectorIndex,
    llm: &dyn LlmClient,
    bm25: &Mutex<Bm25Encoder>,
    reranker: &dyn Reranker,
    index_config: &IndexConfig,
    answering_config: &AnsweringConfig,
    question: &str,
    filter: Option<&Filter>,
    force_dense_only: bool,
) -> Result<Answer> {
    let dense = llm.embed(question).await?.embedding;
    let (sparse, alpha) = if force_dense_only {
        (Default::default(), 0.0)
    } else {
        let encoder = bm25.lock().await;
        let sparse = if encoder.is_fitted() {
            encoder.encode_query(question)
        } else {
            Default::default()
        };
        (sparse, index_config.hybrid_alpha)
    };

    let hits = vector_index
        .query(&dense, &sparse, index_config.top_k_default, alpha, filter)
        .await?;

    let original_order: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
    let reranked_hits = reranker.compress(question, hits.clone()).await.unwrap_or(hits);
    let reranked = reranked_hits.iter().map(|h| h.id.clone()).collect::<Vec<_>>() != original_order;

    let prompt = build_prompt(question, &reranked_hits);
    let generation = llm.generate(&prompt).await?;

    let all_sources = hits_to_sources(&reranked_hits, reranked_hits.len());
    let (sections_referenced, citations_found, papers_referenced) = summarize_sources(&all_sources);
    let sources: Vec<AnswerSource> = all_sources
        .into_iter()
        .take(answering_config.sources_returned)
        .collect();

    Ok(Answer {
        text: generation.text,
        sources,
        metadata: AnswerMetadata {
            total_sources: reranked_hits.len(),
            model_used: generation.model,
            reranked,
            sections_referenced,
            citations_found,
            papers_referenced,
            research_paper_aware: true,
        },
    })
}
