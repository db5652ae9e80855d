//! Hybrid dense+sparse vector index (C5): a dot-product vector store that mixes
//! dense embedding similarity with BM25 sparse scores, Pinecone-metadata-compatible,
//! with `$eq`/`$or` filter pushdown on `source` (spec.md §4.4).

use crate::config::IndexConfig;
use crate::error::{MemoryError, Result};
use crate::paper::bm25::SparseVector;
use crate::paper::types::{Metadata, MetadataValue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePool, Row};
use tracing::{debug, info, warn};

/// A metadata filter predicate (spec.md §4.4, used by session-scoped retrieval to
/// constrain search to a set of completed papers' `source` values).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Filter {
    Eq(String, MetadataValue),
    Or(Vec<Filter>),
}

impl Filter {
    /// Build the `$or` of `$eq` filter scoped to a set of `source` values, the shape
    /// C9's session-scoped retrieval always constructs (spec.md §4.9).
    pub fn sources_in(sources: &[String]) -> Self {
        Filter::Or(
            sources
                .iter()
                .map(|s| Filter::Eq("source".to_string(), MetadataValue::Str(s.clone())))
                .collect(),
        )
    }

    fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Filter::Eq(key, value) => metadata.get(key) == Some(value),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(metadata)),
        }
    }

    /// If this filter is exactly an `$or`-of-`$eq` (or a single `$eq`) over `source`,
    /// return the set of source values so the store can push the predicate into SQL.
    fn as_source_values(&self) -> Option<Vec<String>> {
        match self {
            Filter::Eq(key, value) if key == "source" => {
                value.as_str().map(|s| vec![s.to_string()])
            }
            Filter::Or(filters) => {
                let mut sources = Vec::new();
                for f in filters {
                    match f {
                        Filter::Eq(key, value) if key == "source" => {
                            sources.push(value.as_str()?.to_string());
                        }
                        _ => return None,
                    }
                }
                Some(sources)
            }
            _ => None,
        }
    }
}

/// One vector record: a dense embedding, a BM25 sparse vector, and Pinecone-style
/// metadata (spec.md §3).
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub metadata: Metadata,
}

/// One scored match returned from a query.
#[derive(Debug, Clone)]
pub struct HybridSearchResult {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// Index-level statistics (spec.md §4.4's `describe()`).
#[derive(Debug, Clone, Serialize)]
pub struct IndexDescription {
    pub total_vectors: usize,
    pub dimension: usize,
    pub metric: String,
}

/// A hybrid dense+sparse vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn initialize(&mut self) -> Result<()>;

    /// Upsert records in batches no larger than the configured batch size.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Hybrid query: `alpha` mixes dense and sparse score (0 = pure dense, 1 = pure
    /// sparse), matching spec.md §4.4's `hybrid_alpha`.
    async fn query(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        top_k: usize,
        alpha: f32,
        filter: Option<&Filter>,
    ) -> Result<Vec<HybridSearchResult>>;

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()>;
    async fn delete_by_filter(&self, filter: &Filter) -> Result<()>;
    async fn delete_all(&self) -> Result<()>;
    async fn describe(&self) -> Result<IndexDescription>;

    /// Sample up to `limit` existing chunk texts from the index's metadata, used by
    /// the BM25 encoder's best-effort refit when the process starts unfitted against
    /// an already-populated index (spec.md §4.3).
    async fn sample_metadata_texts(&self, limit: usize) -> Result<Vec<String>>;

    /// Whether this store can actually combine dense and sparse scores. The
    /// SQLite-backed store always can; this exists for adapters over indexes that
    /// only support one metric (spec.md §9's hybrid capability probe).
    fn supports_hybrid(&self) -> bool {
        true
    }
}

fn serialize_f32_vec(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes().to_vec()).collect()
}

fn deserialize_f32_vec(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn serialize_u32_vec(v: &[u32]) -> Vec<u8> {
    v.iter().flat_map(|i| i.to_le_bytes().to_vec()).collect()
}

fn deserialize_u32_vec(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f32 {
    use std::collections::HashMap;
    let b_map: HashMap<u32, f32> = b.indices.iter().copied().zip(b.values.iter().copied()).collect();
    a.indices
        .iter()
        .zip(a.values.iter())
        .filter_map(|(idx, val)| b_map.get(idx).map(|bv| val * bv))
        .sum()
}

fn extract_source(metadata: &Metadata) -> Option<String> {
    metadata.get("source").and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// SQLite-backed implementation. Similarity is computed brute-force over every
/// stored row (spec.md §9: no ANN index, acceptable at corpus scale), except that
/// `source`-scoped `$eq`/`$or` filters are pushed down into the `WHERE` clause.
pub struct SqliteVectorIndex {
    pool: Option<SqlitePool>,
    config: IndexConfig,
}

impl SqliteVectorIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self { pool: None, config }
    }

    fn pool(&self) -> Result<&SqlitePool> {
        self.pool.as_ref().ok_or(MemoryError::NotInitialized.into())
    }

    async fn upsert_batch(&self, pool: &SqlitePool, batch: &[VectorRecord]) -> Result<()> {
        for record in batch {
            if record.dense.len() != self.config.embedding_dim {
                return Err(MemoryError::InvalidDimension {
                    expected: self.config.embedding_dim,
                    actual: record.dense.len(),
                }
                .into());
            }

            let dense_blob = serialize_f32_vec(&record.dense);
            let sparse_idx_blob = serialize_u32_vec(&record.sparse.indices);
            let sparse_val_blob = serialize_f32_vec(&record.sparse.values);
            let metadata_json = serde_json::to_string(&record.metadata)?;
            let source = extract_source(&record.metadata);

            sqlx::query(
                r#"
                INSERT INTO vectors (id, dense, sparse_indices, sparse_values, metadata, source)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    dense = excluded.dense,
                    sparse_indices = excluded.sparse_indices,
                    sparse_values = excluded.sparse_values,
                    metadata = excluded.metadata,
                    source = excluded.source
                "#,
            )
            .bind(&record.id)
            .bind(&dense_blob)
            .bind(&sparse_idx_blob)
            .bind(&sparse_val_blob)
            .bind(&metadata_json)
            .bind(&source)
            .execute(pool)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn initialize(&mut self) -> Result<()> {
        info!("Initializing hybrid vector index '{}'", self.config.index_name);

        let database_url = self
            .config
            .database_url
            .clone()
            .unwrap_or_else(|| "sqlite::memory:".to_string());

        if let Some(db_path) = database_url.strip_prefix("sqlite:") {
            let db_path = db_path.split('?').next().unwrap_or(db_path);
            if let Some(parent) = std::path::Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        MemoryError::StorageFailed(format!("failed to create index directory: {e}"))
                    })?;
                }
            }
        }

        let database_url = if database_url.contains('?') {
            if database_url.contains("mode=") {
                database_url
            } else {
                format!("{database_url}&mode=rwc")
            }
        } else {
            format!("{database_url}?mode=rwc")
        };

        let pool = SqlitePool::connect(&database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                dense BLOB NOT NULL,
                sparse_indices BLOB NOT NULL,
                sparse_values BLOB NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                source TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_source ON vectors(source)")
            .execute(&pool)
            .await?;

        self.pool = Some(pool);
        info!("Hybrid vector index initialized");
        Ok(())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let pool = self.pool()?;
        for batch in records.chunks(self.config.batch_size.max(1)) {
            self.upsert_batch(pool, batch).await?;
        }
        debug!("Upserted {} vectors", records.len());
        Ok(())
    }

    async fn query(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        top_k: usize,
        alpha: f32,
        filter: Option<&Filter>,
    ) -> Result<Vec<HybridSearchResult>> {
        let pool = self.pool()?;

        if dense.len() != self.config.embedding_dim {
            return Err(MemoryError::InvalidDimension {
                expected: self.config.embedding_dim,
                actual: dense.len(),
            }
            .into());
        }

        let pushdown_sources = filter.and_then(|f| f.as_source_values());

        let rows = if let Some(sources) = &pushdown_sources {
            if sources.is_empty() {
                Vec::new()
            } else {
                let placeholders = sources.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!("SELECT * FROM vectors WHERE source IN ({placeholders})");
                let mut q = sqlx::query(&sql);
                for s in sources {
                    q = q.bind(s);
                }
                q.fetch_all(pool).await?
            }
        } else {
            sqlx::query("SELECT * FROM vectors").fetch_all(pool).await?
        };

        let mut results = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            let dense_blob: Vec<u8> = row.get("dense");
            let sparse_idx_blob: Vec<u8> = row.get("sparse_indices");
            let sparse_val_blob: Vec<u8> = row.get("sparse_values");
            let metadata_json: String = row.get("metadata");

            let metadata: Metadata = serde_json::from_str(&metadata_json).unwrap_or_default();

            // Non-pushdown-able filters are evaluated here, brute force.
            if pushdown_sources.is_none() {
                if let Some(f) = filter {
                    if !f.matches(&metadata) {
                        continue;
                    }
                }
            }

            let row_dense = deserialize_f32_vec(&dense_blob);
            let row_sparse = SparseVector {
                indices: deserialize_u32_vec(&sparse_idx_blob),
                values: deserialize_f32_vec(&sparse_val_blob),
            };

            let dense_score = dot(dense, &row_dense);
            let sparse_score = sparse_dot(sparse, &row_sparse);
            let score = (1.0 - alpha) * dense_score + alpha * sparse_score;

            results.push(HybridSearchResult { id, score, metadata });
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()> {
        let pool = self.pool()?;
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM vectors WHERE id IN ({placeholders})");
        let mut q = sqlx::query(&sql);
        for id in ids {
            q = q.bind(id);
        }
        let result = q.execute(pool).await?;
        if result.rows_affected() == 0 {
            warn!("delete_by_ids matched no rows");
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &Filter) -> Result<()> {
        let pool = self.pool()?;
        if let Some(sources) = filter.as_source_values() {
            if sources.is_empty() {
                return Ok(());
            }
            let placeholders = sources.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!("DELETE FROM vectors WHERE source IN ({placeholders})");
            let mut q = sqlx::query(&sql);
            for s in &sources {
                q = q.bind(s);
            }
            q.execute(pool).await?;
            return Ok(());
        }

        // General filters: load, match in Rust, delete by id.
        let rows = sqlx::query("SELECT id, metadata FROM vectors").fetch_all(pool).await?;
        let mut to_delete = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            let metadata_json: String = row.get("metadata");
            let metadata: Metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
            if filter.matches(&metadata) {
                to_delete.push(id);
            }
        }
        self.delete_by_ids(&to_delete).await
    }

    async fn delete_all(&self) -> Result<()> {
        let pool = self.pool()?;
        let result = sqlx::query("DELETE FROM vectors").execute(pool).await?;
        info!("Cleared {} vectors from index", result.rows_affected());
        Ok(())
    }

    async fn describe(&self) -> Result<IndexDescription> {
        let pool = self.pool()?;
        let row = sqlx::query("SELECT COUNT(*) as count FROM vectors")
            .fetch_one(pool)
            .await?;
        let total: i64 = row.get("count");
        Ok(IndexDescription {
            total_vectors: total as usize,
            dimension: self.config.embedding_dim,
            metric: self.config.metric.clone(),
        })
    }

    async fn sample_metadata_texts(&self, limit: usize) -> Result<Vec<String>> {
        let pool = self.pool()?;
        let rows = sqlx::query("SELECT metadata FROM vectors LIMIT ?1")
            .bind(limit as i64)
            .fetch_all(pool)
            .await?;

        let mut texts = Vec::new();
        for row in rows {
            let metadata_json: String = row.get("metadata");
            let metadata: Metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
            if let Some(text) = metadata.get("text").and_then(|v| v.as_str()) {
                texts.push(text.to_string());
            }
        }
        Ok(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config() -> IndexConfig {
        IndexConfig {
            index_name: "test".to_string(),
            database_url: Some("sqlite::memory:".to_string()),
            embedding_dim: 4,
            metric: "dotproduct".to_string(),
            batch_size: 100,
            top_k_default: 10,
            hybrid_alpha: 0.5,
        }
    }

    async fn test_store() -> SqliteVectorIndex {
        let mut store = SqliteVectorIndex::new(test_config());
        store.initialize().await.unwrap();
        store
    }

    fn record(id: &str, dense: Vec<f32>, source: &str) -> VectorRecord {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), MetadataValue::Str(source.to_string()));
        VectorRecord {
            id: id.to_string(),
            dense,
            sparse: SparseVector::default(),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_query_dense_only() {
        let store = test_store().await;
        store
            .upsert(vec![
                record("a", vec![1.0, 0.0, 0.0, 0.0], "p1.pdf"),
                record("b", vec![0.0, 1.0, 0.0, 0.0], "p1.pdf"),
            ])
            .await
            .unwrap();

        let results = store
            .query(&[1.0, 0.0, 0.0, 0.0], &SparseVector::default(), 5, 0.0, None)
            .await
            .unwrap();

        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn test_source_filter_pushdown() {
        let store = test_store().await;
        store
            .upsert(vec![
                record("a", vec![1.0, 0.0, 0.0, 0.0], "p1.pdf"),
                record("b", vec![1.0, 0.0, 0.0, 0.0], "p2.pdf"),
            ])
            .await
            .unwrap();

        let filter = Filter::sources_in(&["p1.pdf".to_string()]);
        let results = store
            .query(&[1.0, 0.0, 0.0, 0.0], &SparseVector::default(), 10, 0.0, Some(&filter))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn test_delete_by_ids() {
        let store = test_store().await;
        store.upsert(vec![record("a", vec![1.0, 0.0, 0.0, 0.0], "p1.pdf")]).await.unwrap();
        store.delete_by_ids(&["a".to_string()]).await.unwrap();
        let desc = store.describe().await.unwrap();
        assert_eq!(desc.total_vectors, 0);
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let store = test_store().await;
        let err = store
            .upsert(vec![record("a", vec![1.0, 0.0], "p1.pdf")])
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_sample_metadata_texts_reads_back_text_field() {
        let store = test_store().await;
        store.upsert(vec![record("a", vec![1.0, 0.0, 0.0, 0.0], "p1.pdf")]).await.unwrap();
        let samples = store.sample_metadata_texts(10).await.unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_sparse_dot_product() {
        let a = SparseVector { indices: vec![1, 2, 3], values: vec![1.0, 2.0, 3.0] };
        let b = SparseVector { indices: vec![2, 3, 4], values: vec![1.0, 1.0, 1.0] };
        assert_eq!(sparse_dot(&a, &b), 2.0 * 1.0 + 3.0 * 1.0);
    }
}
