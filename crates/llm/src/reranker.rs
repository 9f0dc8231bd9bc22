//! Cross-encoder reranker client (component L1)
//!
//! A simplified, HTTP-only rendition of the teacher's `EarlyExitReranker`:
//! we drop the ONNX early-exit cascade (no local model runtime in scope
//! here) and call a cross-encoder scoring endpoint directly, scoring one
//! (query, document) pair per call and batching concurrently. The hybrid
//! searcher (`sme-rag-rag::hybrid`) is the only caller.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use sme_rag_core::{Error, Result};

use crate::LlmError;

#[derive(Debug, Clone)]
pub struct RerankConfig {
    pub endpoint: String,
    pub model: String,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "bge-reranker-v2-m3".to_string(),
        }
    }
}

/// Cross-encoder reranker interface: scores a query against a batch of
/// candidate document texts, returning one relevance score per candidate
/// in input order.
#[async_trait]
pub trait RerankClient: Send + Sync {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

pub struct HttpRerankClient {
    client: Client,
    config: RerankConfig,
}

impl HttpRerankClient {
    pub fn new(config: RerankConfig) -> Self {
        Self { client: Client::new(), config }
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}

#[async_trait]
impl RerankClient for HttpRerankClient {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/rerank", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&RerankRequest { model: &self.config.model, query, documents })
            .send()
            .await
            .map_err(LlmError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("rerank request failed: {status}: {body}")));
        }

        let parsed: RerankResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        if parsed.scores.len() != documents.len() {
            return Err(Error::Llm(format!(
                "rerank returned {} scores for {} documents",
                parsed.scores.len(),
                documents.len()
            )));
        }
        Ok(parsed.scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_bge_model() {
        let config = RerankConfig::default();
        assert_eq!(config.model, "bge-reranker-v2-m3");
    }
}
