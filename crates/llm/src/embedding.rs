//! Embedding client (component L1)
//!
//! Adapted from the teacher's `OllamaEmbedder`: a thin HTTP adapter over
//! an Ollama-compatible `/api/embed` endpoint. Wrapped in `CachedEmbeddingClient`
//! so repeated queries (classifier centroid comparisons, cache-key lookups,
//! identical sub-queries across a retry ladder) skip the network round trip.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use sme_rag_core::{Error, Result};

use crate::cache::LruCache;
use crate::LlmError;

/// Embedding backend configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub dim: usize,
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "bge-m3".to_string(),
            dim: 1024,
            cache_capacity: 2048,
        }
    }
}

/// Embedding client interface, implemented by the HTTP adapter and mocked
/// in tests.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
    fn dim(&self) -> usize;
}

/// HTTP client over an Ollama-compatible embedding endpoint.
pub struct OllamaEmbeddingClient {
    client: Client,
    config: EmbeddingConfig,
}

impl OllamaEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { client: Client::new(), config }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embed", self.config.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest { model: &self.config.model, input: text })
            .send()
            .await
            .map_err(LlmError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("embedding request failed: {status}: {body}")));
        }

        let parsed: EmbedResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("embedding response contained no vectors".to_string()))
    }

    fn dim(&self) -> usize {
        self.config.dim
    }
}

/// Wraps any `EmbeddingClient` with an LRU cache keyed by exact text match.
pub struct CachedEmbeddingClient<E> {
    inner: E,
    cache: LruCache<String, Arc<Vec<f32>>>,
}

impl<E: EmbeddingClient> CachedEmbeddingClient<E> {
    pub fn new(inner: E, capacity: usize) -> Self {
        Self { inner, cache: LruCache::new(capacity) }
    }
}

#[async_trait]
impl<E: EmbeddingClient> EmbeddingClient for CachedEmbeddingClient<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.get(&text.to_string()) {
            return Ok((*cached).clone());
        }
        let embedding = self.inner.embed(text).await?;
        self.cache.put(text.to_string(), Arc::new(embedding.clone()));
        Ok(embedding)
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingEmbedder {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![text.len() as f32])
        }
        fn dim(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn test_cache_avoids_repeat_calls() {
        let cached = CachedEmbeddingClient::new(
            CountingEmbedder { calls: std::sync::atomic::AtomicUsize::new(0) },
            8,
        );
        cached.embed("부가세 신고").await.unwrap();
        cached.embed("부가세 신고").await.unwrap();
        assert_eq!(cached.inner.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
