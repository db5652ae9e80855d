//! External registry client (spec.md §6.6): the HTTP-backed state store that owns
//! session RAG state, session<->paper membership, and chat accounting. Grounded on
//! the teacher's `HttpA2AClient` (`src/a2a.rs`): base URL from configuration, an
//! internal-service header attached to every request, transient failures classified
//! through the existing `AgentError` taxonomy.

use crate::config::ExternalRegistryConfig;
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRagStatus {
    pub session_id: String,
    pub is_rag_enabled: bool,
    pub enabled_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPaper {
    pub paper_id: String,
    pub file_name: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagDocumentRecord {
    pub paper_id: String,
    pub file_name: String,
    pub processing_status: String,
    pub processing_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStats {
    pub total_chats: u64,
    pub rag_chats: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRecord {
    pub paper_id: String,
    pub title: String,
    pub arxiv_id: Option<String>,
}

/// The endpoints enumerated in spec.md §6.6: session RAG state, session<->paper
/// membership, ingestion-record mirroring, chat accounting, and paper reads.
#[async_trait]
pub trait ExternalRegistry: Send + Sync {
    async fn enable_session_rag(&self, session_id: &str, actor_id: &str) -> Result<()>;
    async fn disable_session_rag(&self, session_id: &str) -> Result<()>;
    async fn session_rag_status(&self, session_id: &str) -> Result<SessionRagStatus>;

    async fn list_session_papers(&self, session_id: &str) -> Result<Vec<SessionPaper>>;

    async fn create_rag_document(&self, record: &RagDocumentRecord) -> Result<()>;
    async fn update_rag_document_status(
        &self,
        paper_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<()>;
    async fn get_rag_document(&self, paper_id: &str) -> Result<Option<RagDocumentRecord>>;

    async fn record_chat_metadata(&self, chat: &crate::paper::types::ChatMetadata) -> Result<()>;
    async fn chat_stats(&self, session_id: &str) -> Result<ChatStats>;

    async fn get_paper(&self, paper_id: &str) -> Result<Option<PaperRecord>>;
    async fn create_arxiv_paper(&self, record: &PaperRecord) -> Result<()>;
    async fn update_arxiv_paper(&self, record: &PaperRecord) -> Result<()>;
}

pub struct HttpExternalRegistry {
    client: reqwest::Client,
    base_url: String,
    internal_service_header: Option<String>,
}

impl HttpExternalRegistry {
    pub fn new(config: &ExternalRegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build registry client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            internal_service_header: config.internal_service_header.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(header) = &self.internal_service_header {
            req = req.header("X-Internal-Service", header);
        }
        req
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = req
            .send()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AgentError::NotFound(response.url().to_string()));
        }
        if !response.status().is_success() {
            return Err(AgentError::Network(format!(
                "registry request failed with status {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AgentError::Network(format!("failed to parse registry response: {e}")))
    }
}

#[async_trait]
impl ExternalRegistry for HttpExternalRegistry {
    async fn enable_session_rag(&self, session_id: &str, actor_id: &str) -> Result<()> {
        debug!("enabling RAG for session {session_id}");
        let req = self
            .request(reqwest::Method::POST, &format!("/sessions/{session_id}/rag/enable"))
            .json(&serde_json::json!({ "actor_id": actor_id }));
        req.send().await.map_err(|e| AgentError::Network(e.to_string()))?;
        Ok(())
    }

    async fn disable_session_rag(&self, session_id: &str) -> Result<()> {
        let req = self.request(reqwest::Method::POST, &format!("/sessions/{session_id}/rag/disable"));
        req.send().await.map_err(|e| AgentError::Network(e.to_string()))?;
        Ok(())
    }

    async fn session_rag_status(&self, session_id: &str) -> Result<SessionRagStatus> {
        let req = self.request(reqwest::Method::GET, &format!("/sessions/{session_id}/rag/status"));
        self.send_json(req).await
    }

    async fn list_session_papers(&self, session_id: &str) -> Result<Vec<SessionPaper>> {
        let req = self.request(reqwest::Method::GET, &format!("/sessions/{session_id}/papers"));
        self.send_json(req).await
    }

    async fn create_rag_document(&self, record: &RagDocumentRecord) -> Result<()> {
        let req = self.request(reqwest::Method::POST, "/rag-documents").json(record);
        req.send().await.map_err(|e| AgentError::Network(e.to_string()))?;
        Ok(())
    }

    async fn update_rag_document_status(
        &self,
        paper_id: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<()> {
        let req = self
            .request(reqwest::Method::PATCH, &format!("/rag-documents/{paper_id}"))
            .json(&serde_json::json!({ "processing_status": status, "processing_error": error }));
        req.send().await.map_err(|e| AgentError::Network(e.to_string()))?;
        Ok(())
    }

    async fn get_rag_document(&self, paper_id: &str) -> Result<Option<RagDocumentRecord>> {
        let req = self.request(reqwest::Method::GET, &format!("/rag-documents/{paper_id}"));
        match self.send_json(req).await {
            Ok(record) => Ok(Some(record)),
            Err(AgentError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn record_chat_metadata(&self, chat: &crate::paper::types::ChatMetadata) -> Result<()> {
        let req = self.request(reqwest::Method::POST, "/chat-metadata").json(chat);
        req.send().await.map_err(|e| AgentError::Network(e.to_string()))?;
        Ok(())
    }

    async fn chat_stats(&self, session_id: &str) -> Result<ChatStats> {
        let req = self.request(reqwest::Method::GET, &format!("/sessions/{session_id}/chat-stats"));
        self.send_json(req).await
    }

    async fn get_paper(&self, paper_id: &str) -> Result<Option<PaperRecord>> {
        let req = self.request(reqwest::Method::GET, &format!("/papers/{paper_id}"));
        match self.send_json(req).await {
            Ok(record) => Ok(Some(record)),
            Err(AgentError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_arxiv_paper(&self, record: &PaperRecord) -> Result<()> {
        let req = self.request(reqwest::Method::POST, "/papers/arxiv").json(record);
        req.send().await.map_err(|e| AgentError::Network(e.to_string()))?;
        Ok(())
    }

    async fn update_arxiv_paper(&self, record: &PaperRecord) -> Result<()> {
        let req = self
            .request(reqwest::Method::PATCH, &format!("/papers/arxiv/{}", record.paper_id))
            .json(record);
        req.send().await.map_err(|e| AgentError::Network(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_session_rag_status_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions/s1/rag/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "session_id": "s1",
                "is_rag_enabled": true,
                "enabled_by": "alice",
            })))
            .mount(&server)
            .await;

        let config = ExternalRegistryConfig {
            base_url: server.uri(),
            internal_service_header: Some("internal".to_string()),
            timeout: 10,
        };
        let client = HttpExternalRegistry::new(&config).unwrap();
        let status = client.session_rag_status("s1").await.unwrap();
        assert!(status.is_rag_enabled);
        assert_eq!(status.enabled_by.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_get_rag_document_not_found_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rag-documents/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = ExternalRegistryConfig {
            base_url: server.uri(),
            internal_service_header: None,
            timeout: 10,
        };
        let client = HttpExternalRegistry::new(&config).unwrap();
        let record = client.get_rag_document("missing").await.unwrap();
        assert!(record.is_none());
    }
}
