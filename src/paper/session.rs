//! Session RAG Coordinator (C9): per-session enable/disable, auto-ingestion from a
//! paper URL, and scoped question answering restricted to a session's completed
//! papers (spec.md §4.8).

use crate::config::RagConfig;
use crate::error::{AgentError, PaperError, Result};
use crate::llm::LlmClient;
use crate::memory::{Filter, VectorIndex};
use crate::paper::answer::{ask, AnswerMetadata};
use crate::paper::bm25::Bm25Encoder;
use crate::paper::ingest::{self, IngestDeps};
use crate::paper::registry::DocumentRegistry;
use crate::paper::registry_client::{ExternalRegistry, SessionRagStatus};
use crate::paper::types::ChatMetadata;
use crate::rerank::Reranker;
use tokio::sync::Mutex;
use tracing::{info, warn};

const NOT_ENABLED_MESSAGE: &str =
    "Retrieval-augmented answering is not enabled for this session. Call enable() first.";
const NO_DOCUMENTS_MESSAGE: &str =
    "No documents have finished processing for this session yet.";
const NO_MATCHES_MESSAGE: &str =
    "I couldn't find any relevant information in this session's documents to answer that question.";

/// Shared dependencies the coordinator composes from (spec.md §5's process-wide
/// singletons, threaded through explicitly rather than via a god object).
pub struct SessionDeps<'a> {
    pub config: &'a RagConfig,
    pub registry: &'a DocumentRegistry,
    pub vector_index: &'a dyn VectorIndex,
    pub llm: &'a dyn LlmClient,
    pub bm25: &'a Mutex<Bm25Encoder>,
    pub reranker: &'a dyn Reranker,
    pub external: &'a dyn ExternalRegistry,
}

pub async fn enable(deps: &SessionDeps<'_>, session_id: &str, actor_id: &str) -> Result<()> {
    deps.external.enable_session_rag(session_id, actor_id).await
}

pub async fn disable(deps: &SessionDeps<'_>, session_id: &str) -> Result<()> {
    deps.external.disable_session_rag(session_id).await
}

pub async fn status(deps: &SessionDeps<'_>, session_id: &str) -> Result<SessionRagStatus> {
    deps.external.session_rag_status(session_id).await
}

/// Build the safe filename `paper_<paper_id>_<sanitized_title>[:50].pdf` (spec.md §4.8).
pub fn safe_filename(paper_id: &str, title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let truncated: String = sanitized.chars().take(50).collect();
    format!("paper_{paper_id}_{truncated}.pdf")
}

/// Download PDF bytes from `pdf_url`, retrying against the `/pdf/` form if the
/// `/abs/` form didn't return a PDF content type (spec.md §4.8).
async fn download_pdf(client: &reqwest::Client, pdf_url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(pdf_url)
        .send()
        .await
        .map_err(|e| AgentError::Network(e.to_string()))?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.contains("application/pdf") {
        return Ok(response
            .bytes()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?
            .to_vec());
    }

    let retry_url = pdf_url.replace("/abs/", "/pdf/");
    if retry_url != pdf_url {
        warn!("content-type {content_type} for {pdf_url}, retrying as {retry_url}");
        let retry_response = client
            .get(&retry_url)
            .send()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?;
        return Ok(retry_response
            .bytes()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?
            .to_vec());
    }

    Err(PaperError::IngestFailed(format!(
        "expected application/pdf, got {content_type} for {pdf_url}"
    ))
    .into())
}

/// `auto_ingest(session_id, paper_id, pdf_url, title, authors?)` (spec.md §4.8):
/// download, derive a safe filename, hand off to C6, mirror the outcome to the
/// external registry.
pub async fn auto_ingest(
    ingest_deps: &IngestDeps<'_>,
    external: &dyn ExternalRegistry,
    session_id: &str,
    paper_id: &str,
    pdf_url: &str,
    title: &str,
) -> Result<ingest::IngestionOutcome> {
    let client = reqwest::Client::new();
    let filename = safe_filename(paper_id, title);

    let bytes = match download_pdf(&client, pdf_url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("auto_ingest download failed for session {session_id}, paper {paper_id}: {e}");
            external
                .update_rag_document_status(paper_id, "failed", Some(&e.to_string()))
                .await
                .ok();
            return Err(e);
        }
    };

    match ingest::ingest(ingest_deps, &bytes, &filename, Some(paper_id.to_string())).await {
        Ok(outcome) => {
            external
                .update_rag_document_status(paper_id, "completed", None)
                .await
                .ok();
            Ok(outcome)
        }
        Err(e) => {
            external
                .update_rag_document_status(paper_id, "failed", Some(&e.to_string()))
                .await
                .ok();
            Err(e)
        }
    }
}

/// A scoped answer, extending the plain [`Answer`] with session-scoping annotations
/// (spec.md §4.8's `{session_id, session_scoped, session_files_searched}`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScopedAnswer {
    pub text: String,
    pub sources: Vec<crate::paper::answer::AnswerSource>,
    pub metadata: AnswerMetadata,
    pub session_id: String,
    pub session_scoped: bool,
    pub session_files_searched: Vec<String>,
    pub fallback_without_filter: bool,
}

fn fixed_answer(session_id: &str, text: &str) -> ScopedAnswer {
    ScopedAnswer {
        text: text.to_string(),
        sources: Vec::new(),
        metadata: AnswerMetadata {
            total_sources: 0,
            model_used: String::new(),
            reranked: false,
            sections_referenced: Vec::new(),
            citations_found: Vec::new(),
            papers_referenced: Vec::new(),
            research_paper_aware: true,
        },
        session_id: session_id.to_string(),
        session_scoped: true,
        session_files_searched: Vec::new(),
        fallback_without_filter: false,
    }
}

/// `ask_scoped(session_id, question, top_k)` (spec.md §4.8).
pub async fn ask_scoped(deps: &SessionDeps<'_>, session_id: &str, question: &str) -> Result<ScopedAnswer> {
    let rag_status = deps.external.session_rag_status(session_id).await?;
    if !rag_status.is_rag_enabled {
        return Ok(fixed_answer(session_id, NOT_ENABLED_MESSAGE));
    }

    let session_papers = deps.external.list_session_papers(session_id).await?;
    let completed: Vec<String> = session_papers
        .iter()
        .filter(|p| p.status == "completed")
        .map(|p| p.file_name.clone())
        .collect();

    if completed.is_empty() {
        return Ok(fixed_answer(session_id, NO_DOCUMENTS_MESSAGE));
    }

    let sources: Vec<String> = completed
        .iter()
        .map(|fn_| ingest::scoped_source(&deps.config.storage.input_dir, fn_))
        .collect();
    let filter = Filter::sources_in(&sources);

    // Session-scoped answering runs a single dense query through C5 (spec.md §4.8),
    // a deliberate divergence from the hybrid dense+sparse retrieval §4.7 uses.
    let (answer, fallback_without_filter) = match ask(
        deps.vector_index,
        deps.llm,
        deps.bm25,
        deps.reranker,
        &deps.config.index,
        &deps.config.answering,
        question,
        Some(&filter),
        true,
    )
    .await
    {
        Ok(answer) => (answer, false),
        Err(e) => {
            warn!("scoped query failed for session {session_id}, falling back without filter: {e}");
            let answer = ask(
                deps.vector_index,
                deps.llm,
                deps.bm25,
                deps.reranker,
                &deps.config.index,
                &deps.config.answering,
                question,
                None,
                true,
            )
            .await?;
            (answer, true)
        }
    };

    if answer.sources.is_empty() {
        return Ok(fixed_answer(session_id, NO_MATCHES_MESSAGE));
    }

    Ok(ScopedAnswer {
        text: answer.text,
        sources: answer.sources,
        metadata: answer.metadata,
        session_id: session_id.to_string(),
        session_scoped: true,
        session_files_searched: completed,
        fallback_without_filter,
    })
}

/// `record_chat(...)` (spec.md §4.8): append-only, mirrored to the external registry.
pub async fn record_chat(deps: &SessionDeps<'_>, chat: ChatMetadata) -> Result<()> {
    deps.external.record_chat_metadata(&chat).await
}
