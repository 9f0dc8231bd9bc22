//! Embedding, rerank, and chat LLM clients (component L1)
//!
//! Thin, cached adapters over three backend models reachable over HTTP
//! (an Ollama-compatible chat/embedding server): the chat LLM used for
//! classification, decomposition, rewriting, generation and evaluation;
//! the embedding model used for dense retrieval and centroid caching; and
//! the cross-encoder reranker used by the hybrid searcher. Each client
//! enforces per-request token accounting so the router can budget
//! generation length against `GENERATION_MAX_TOKENS`.

pub mod cache;
pub mod chat;
pub mod embedding;
pub mod prompt;
pub mod reranker;

pub use cache::LruCache;
pub use chat::{ChatLlmClient, ChatLlmConfig};
pub use embedding::{CachedEmbeddingClient, EmbeddingClient, EmbeddingConfig, OllamaEmbeddingClient};
pub use prompt::PromptBuilder;
pub use reranker::{HttpRerankClient, RerankClient, RerankConfig};

use thiserror::Error;

/// LLM/embedding/reranker transport errors.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("generation error: {0}")]
    Generation(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timed out")]
    Timeout,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for sme_rag_core::Error {
    fn from(err: LlmError) -> Self {
        sme_rag_core::Error::Llm(err.to_string())
    }
}
