//! Ingestion Orchestrator (C6): drives PDF bytes through structural analysis,
//! chunking, embedding, and upsert, tracking per-document state in the registry
//! (spec.md §4.5).

use crate::config::RagConfig;
use crate::error::{AgentError, PaperError, Result};
use crate::llm::LlmClient;
use crate::memory::{Filter, VectorIndex, VectorRecord};
use crate::paper::analyzer;
use crate::paper::bm25::Bm25Encoder;
use crate::paper::chunker::{self, Page};
use crate::paper::registry::DocumentRegistry;
use crate::paper::sanitize::sanitize_metadata;
use crate::paper::types::Chunk;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Single normalization point for the `source` value stored in chunk metadata and
/// used to build retrieval filters (spec.md §9's Open Question: "filter construction
/// must be normalized at one place, not duplicated"). The chunk id still uses the
/// bare filename so it stays stable independent of `input_dir`.
pub fn scoped_source(input_dir: &str, filename: &str) -> String {
    format!("{}/{}", input_dir.trim_end_matches('/'), filename)
}

/// Split `pdf-extract`'s single-string output on the form-feed byte it inserts
/// between pages in practice; falls back to a single page when absent (SPEC_FULL.md
/// §4.5's resolution of the page-boundary gap).
pub fn split_into_pages(text: &str) -> Vec<Page> {
    if text.contains('\x0C') {
        text.split('\x0C')
            .enumerate()
            .map(|(i, page_text)| Page {
                number: (i + 1) as i64,
                text: page_text.to_string(),
            })
            .collect()
    } else {
        vec![Page {
            number: 1,
            text: text.to_string(),
        }]
    }
}

/// Ensure the BM25 encoder is fitted before a batch is encoded, following the
/// fitting policy in spec.md §4.3: fit on the first batch if the index is empty,
/// otherwise attempt a best-effort refit sampled from existing index metadata, and
/// degrade to dense-only if that sample is empty.
pub async fn ensure_bm25_fitted(
    bm25: &Mutex<Bm25Encoder>,
    vector_index: &dyn VectorIndex,
    current_batch_texts: &[String],
) -> bool {
    let mut encoder = bm25.lock().await;
    if encoder.is_fitted() {
        return true;
    }

    let total_vectors = match vector_index.describe().await {
        Ok(desc) => desc.total_vectors,
        Err(_) => 0,
    };

    if total_vectors == 0 {
        encoder.fit(current_batch_texts);
        return true;
    }

    match vector_index.sample_metadata_texts(100).await {
        Ok(sample) if !sample.is_empty() => {
            encoder.fit(&sample);
            true
        }
        _ => {
            warn!("BM25 refit from index yielded no corpus; degrading to dense-only retrieval");
            false
        }
    }
}

/// The outcome of one `ingest` call.
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub paper_id: String,
    pub chunks_count: usize,
    pub vector_store_ids: Vec<String>,
}

/// Dependencies the orchestrator needs, passed explicitly rather than through a
/// single god-object so the orchestrator stays independently testable.
pub struct IngestDeps<'a> {
    pub config: &'a RagConfig,
    pub registry: &'a DocumentRegistry,
    pub vector_index: &'a dyn VectorIndex,
    pub llm: &'a dyn LlmClient,
    pub bm25: &'a Mutex<Bm25Encoder>,
}

/// `ingest(file_bytes, filename, paper_id?)` (spec.md §4.5).
pub async fn ingest(
    deps: &IngestDeps<'_>,
    file_bytes: &[u8],
    filename: &str,
    paper_id: Option<String>,
) -> Result<IngestionOutcome> {
    let paper_id = paper_id.unwrap_or_else(|| {
        filename
            .strip_suffix(".pdf")
            .unwrap_or(filename)
            .to_string()
    });

    let file_path = format!(
        "{}/{}",
        deps.config.storage.input_dir.trim_end_matches('/'),
        filename
    );
    std::fs::create_dir_all(&deps.config.storage.input_dir)?;
    std::fs::write(&file_path, file_bytes)?;

    deps.registry
        .begin_ingestion(paper_id.clone(), filename.to_string(), file_path.clone())
        .await?;

    match run_ingestion(deps, file_bytes, filename, &paper_id).await {
        Ok(outcome) => {
            deps.registry
                .mark_completed(&paper_id, outcome.chunks_count, outcome.vector_store_ids.clone())
                .await?;
            Ok(outcome)
        }
        Err(e) => {
            deps.registry.mark_failed(&paper_id, e.to_string()).await.ok();
            Err(e)
        }
    }
}

async fn run_ingestion(
    deps: &IngestDeps<'_>,
    file_bytes: &[u8],
    filename: &str,
    paper_id: &str,
) -> Result<IngestionOutcome> {
    let text = extract_pdf_text(file_bytes)?;
    let pages = split_into_pages(&text);
    let full_text: String = pages.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n");

    let sections = analyzer::detect_sections(&full_text);
    let citations: Vec<String> = analyzer::extract_citations(&full_text);
    let figures_tables = analyzer::extract_figures_tables(&full_text);
    let mut paper = analyzer::extract_paper_metadata(&full_text, filename);
    if paper.paper_id.is_empty() {
        paper.paper_id = paper_id.to_string();
    }

    let mut chunks = chunker::chunk_document(
        &pages,
        filename,
        &sections,
        &citations,
        &figures_tables,
        &paper,
        &deps.config.chunking,
    );

    if chunks.is_empty() {
        return Err(PaperError::IngestFailed("no chunks produced from document".to_string()).into());
    }

    let full_source = scoped_source(&deps.config.storage.input_dir, filename);
    for chunk in &mut chunks {
        chunk.source = full_source.clone();
    }

    let mut all_ids = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(deps.config.index.batch_size.max(1)) {
        let ids = upsert_batch(deps, batch).await?;
        all_ids.extend(ids);
    }

    Ok(IngestionOutcome {
        paper_id: paper.paper_id,
        chunks_count: chunks.len(),
        vector_store_ids: all_ids,
    })
}

async fn upsert_batch(deps: &IngestDeps<'_>, batch: &[Chunk]) -> Result<Vec<String>> {
    let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
    let sparse_available = ensure_bm25_fitted(deps.bm25, deps.vector_index, &texts).await;

    let mut records = Vec::with_capacity(batch.len());
    for chunk in batch {
        let dense = deps.llm.embed(&chunk.text).await?.embedding;
        let sparse = if sparse_available {
            deps.bm25.lock().await.encode_document(&chunk.text)
        } else {
            Default::default()
        };
        let metadata = sanitize_metadata(&chunk.metadata());

        records.push(VectorRecord {
            id: chunk.chunk_id.clone(),
            dense,
            sparse,
            metadata,
        });
    }

    let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

    if let Err(e) = deps.vector_index.upsert(records.clone()).await {
        warn!("hybrid upsert failed ({e}), retrying dense-only");
        let dense_only: Vec<VectorRecord> = records
            .into_iter()
            .map(|mut r| {
                r.sparse = Default::default();
                r
            })
            .collect();
        deps.vector_index.upsert(dense_only).await?;
    }

    Ok(ids)
}

#[cfg(feature = "pdf")]
fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| AgentError::from(PaperError::IngestFailed(format!("PDF extraction failed: {e}"))))
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf_text(_bytes: &[u8]) -> Result<String> {
    Err(PaperError::IngestFailed("PDF support not compiled in (enable the `pdf` feature)".to_string()).into())
}

/// `remove_document(source)` (spec.md §4.5): query with a dummy vector across the
/// full index, keep matches whose `source` equals the given value (preferring
/// equality over the original's substring match, per spec.md §9's Open Question),
/// delete in batches, and return the deleted count. `source` must already be in
/// the normalized form produced by [`scoped_source`].
pub async fn remove_document(
    vector_index: &dyn VectorIndex,
    dimension: usize,
    source: &str,
) -> Result<usize> {
    let desc = vector_index.describe().await?;
    if desc.total_vectors == 0 {
        return Ok(0);
    }

    let dummy = vec![0.0f32; dimension];
    let filter = Filter::sources_in(&[source.to_string()]);
    let matches = vector_index
        .query(&dummy, &Default::default(), desc.total_vectors, 0.0, Some(&filter))
        .await?;

    let ids: Vec<String> = matches.into_iter().map(|m| m.id).collect();
    let count = ids.len();
    if count > 0 {
        vector_index.delete_by_ids(&ids).await?;
    }
    info!("removed {count} chunks for document {source}");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_into_pages_on_form_feed() {
        let text = "page one\x0Cpage two\x0Cpage three";
        let pages = split_into_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].text, "page two");
    }

    #[test]
    fn test_split_into_pages_without_form_feed_is_single_page() {
        let pages = split_into_pages("no page breaks here");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 1);
    }

    #[test]
    fn test_scoped_source_normalizes_trailing_slash() {
        assert_eq!(scoped_source("input", "a.pdf"), "input/a.pdf");
        assert_eq!(scoped_source("input/", "a.pdf"), "input/a.pdf");
    }
}
