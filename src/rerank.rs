//! Reranker (C7): an optional post-retrieval compression step that reorders or
//! trims hybrid search hits before they reach the answering engine (spec.md §4.6).
//! Errors from the reranker are non-fatal: the answering engine falls back to the
//! unreranked hit list (spec.md §7, §9).

use crate::config::RerankerConfig;
use crate::error::{AgentError, Result};
use crate::memory::HybridSearchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Reorders or trims a set of retrieved chunks given the original query.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn compress(
        &self,
        query: &str,
        hits: Vec<HybridSearchResult>,
    ) -> Result<Vec<HybridSearchResult>>;
}

/// Passes hits through unchanged; used when no reranker endpoint is configured
/// (spec.md §9).
pub struct NoopReranker;

#[async_trait]
impl Reranker for NoopReranker {
    async fn compress(
        &self,
        _query: &str,
        hits: Vec<HybridSearchResult>,
    ) -> Result<Vec<HybridSearchResult>> {
        Ok(hits)
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RerankResponseItem {
    index: usize,
    score: f32,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResponseItem>,
}

/// Calls an external cross-encoder rerank HTTP endpoint.
pub struct HttpReranker {
    client: reqwest::Client,
    endpoint_url: String,
    api_key: Option<String>,
}

impl HttpReranker {
    pub fn new(config: &RerankerConfig) -> Result<Option<Self>> {
        let Some(endpoint_url) = config.endpoint_url.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build rerank client: {e}")))?;
        Ok(Some(Self {
            client,
            endpoint_url,
            api_key: config.api_key.clone(),
        }))
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn compress(
        &self,
        query: &str,
        hits: Vec<HybridSearchResult>,
    ) -> Result<Vec<HybridSearchResult>> {
        if hits.is_empty() {
            return Ok(hits);
        }

        let documents: Vec<&str> = hits
            .iter()
            .map(|h| h.metadata.get("text").and_then(|v| v.as_str()).unwrap_or(""))
            .collect();

        let mut request = self
            .client
            .post(&self.endpoint_url)
            .json(&RerankRequest { query, documents });

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            warn!("rerank request failed, falling back to original order: {e}");
            AgentError::Network(e.to_string())
        });

        let response = match response {
            Ok(r) => r,
            Err(_) => return Ok(hits),
        };

        if !response.status().is_success() {
            warn!("rerank endpoint returned {}", response.status());
            return Ok(hits);
        }

        let parsed: RerankResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to parse rerank response: {e}");
                return Ok(hits);
            }
        };

        let mut reordered: Vec<HybridSearchResult> = Vec::with_capacity(hits.len());
        let mut hits: Vec<Option<HybridSearchResult>> = hits.into_iter().map(Some).collect();
        let mut items = parsed.results;
        items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        for item in items {
            if let Some(slot) = hits.get_mut(item.index) {
                if let Some(mut hit) = slot.take() {
                    hit.score = item.score;
                    reordered.push(hit);
                }
            }
        }
        for remaining in hits.into_iter().flatten() {
            reordered.push(remaining);
        }

        debug!("reranked {} hits", reordered.len());
        Ok(reordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn hit(id: &str, score: f32) -> HybridSearchResult {
        HybridSearchResult {
            id: id.to_string(),
            score,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_noop_reranker_passes_through() {
        let reranker = NoopReranker;
        let hits = vec![hit("a", 1.0), hit("b", 0.5)];
        let out = reranker.compress("query", hits.clone()).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "a");
    }

    #[test]
    fn test_http_reranker_not_constructed_without_endpoint() {
        let config = RerankerConfig::default();
        let reranker = HttpReranker::new(&config).unwrap();
        assert!(reranker.is_none());
    }
}
