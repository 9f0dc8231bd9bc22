//! Retrieval traits for RAG
//!
//! Implementations:
//! - `HybridSearcher` (sme-rag-rag) — dense + sparse RRF fusion, optional rerank
//! - retry-ladder orchestration lives one layer up, in the retrieval agent

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::Result;

/// Retriever interface for RAG backends.
#[async_trait]
pub trait Retriever: Send + Sync + 'static {
    /// Retrieve relevant documents for a single query against one domain's
    /// collections, already fused and (optionally) reranked.
    async fn retrieve(&self, query: &str, options: &RetrieveOptions) -> Result<Vec<Document>>;

    /// Retriever name for logging.
    fn name(&self) -> &str;
}

/// Retrieval options threaded through one retrieve() call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveOptions {
    pub top_k: usize,
    pub min_score: f32,
    #[serde(default)]
    pub filters: Vec<MetadataFilter>,
    #[serde(default = "default_true")]
    pub rerank: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_model: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.0,
            filters: Vec::new(),
            rerank: true,
            rerank_model: None,
        }
    }
}

impl RetrieveOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score.clamp(0.0, 1.0);
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn without_rerank(mut self) -> Self {
        self.rerank = false;
        self
    }
}

/// Metadata filter for retrieval (e.g. restrict to a domain's collection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: serde_json::Value,
}

impl MetadataFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self { field: field.into(), op: FilterOp::Equals, value: value.into() }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Contains,
            value: serde_json::Value::String(value.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
}
