//! Document Registry (C10): per-paper ingestion lifecycle state, in-process memory
//! owned by the composition root (spec.md §3, §4.5).

use crate::error::{PaperError, Result};
use crate::paper::types::{IngestionRecord, ProcessingStatus};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Tracks one [`IngestionRecord`] per `paper_id`. A given `paper_id` maps to at most
/// one record at any time (spec.md §3's paper-identity invariant).
#[derive(Default)]
pub struct DocumentRegistry {
    records: RwLock<HashMap<String, IngestionRecord>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a `pending` record for a newly-persisted upload, then immediately
    /// transition it to `processing` (spec.md §4.5 step 1).
    pub async fn begin_ingestion(
        &self,
        paper_id: impl Into<String>,
        file_name: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Result<()> {
        let paper_id = paper_id.into();
        let mut record = IngestionRecord::new_pending(paper_id.clone(), file_name, file_path);

        let next = ProcessingStatus::Processing;
        if !record.processing_status.can_transition_to(next) {
            return Err(PaperError::IngestFailed(format!(
                "cannot start ingestion for {paper_id}"
            ))
            .into());
        }
        record.processing_status = next;

        let mut records = self.records.write().await;
        records.insert(paper_id, record);
        Ok(())
    }

    /// Transition a `failed` record back to `processing` for a retry (spec.md §3).
    pub async fn retry_ingestion(&self, paper_id: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(paper_id)
            .ok_or_else(|| PaperError::NotFound(paper_id.to_string()))?;

        if !record.processing_status.can_transition_to(ProcessingStatus::Processing) {
            return Err(PaperError::IngestFailed(format!(
                "{paper_id} cannot be retried from {:?}",
                record.processing_status
            ))
            .into());
        }
        record.processing_status = ProcessingStatus::Processing;
        record.processing_error = None;
        Ok(())
    }

    pub async fn mark_completed(
        &self,
        paper_id: &str,
        chunks_count: usize,
        vector_store_ids: Vec<String>,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(paper_id)
            .ok_or_else(|| PaperError::NotFound(paper_id.to_string()))?;

        if !record.processing_status.can_transition_to(ProcessingStatus::Completed) {
            return Err(PaperError::IngestFailed(format!(
                "{paper_id} cannot complete from {:?}",
                record.processing_status
            ))
            .into());
        }
        record.processing_status = ProcessingStatus::Completed;
        record.chunks_count = chunks_count;
        record.vector_store_ids = vector_store_ids;
        debug!("paper {paper_id} completed with {chunks_count} chunks");
        Ok(())
    }

    pub async fn mark_failed(&self, paper_id: &str, error: impl Into<String>) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(paper_id)
            .ok_or_else(|| PaperError::NotFound(paper_id.to_string()))?;

        let error = error.into();
        if !record.processing_status.can_transition_to(ProcessingStatus::Failed) {
            warn!("paper {paper_id} failed from non-processing state: {error}");
        }
        record.processing_status = ProcessingStatus::Failed;
        record.processing_error = Some(error);
        Ok(())
    }

    pub async fn get(&self, paper_id: &str) -> Option<IngestionRecord> {
        self.records.read().await.get(paper_id).cloned()
    }

    /// Filenames of all papers in the terminal `completed` state (spec.md's
    /// "Completed paper" glossary entry), the set C9 scopes retrieval against.
    pub async fn completed_file_names(&self) -> Vec<String> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.processing_status == ProcessingStatus::Completed && r.chunks_count > 0)
            .map(|r| r.file_name.clone())
            .collect()
    }

    pub async fn remove(&self, paper_id: &str) -> Option<IngestionRecord> {
        self.records.write().await.remove(paper_id)
    }
}
