//! Hybrid retrieval: vector store façade, BM25 index, RRF fusion, and the
//! graduated-retry retrieval agent.
//!
//! - Dense vector search via Qdrant, with MMR diversification
//! - Sparse BM25 search via Tantivy, one index per domain
//! - RRF fusion with strategy-dependent dense/sparse weights
//! - Optional cross-encoder rerank pass
//! - Adaptive strategy selection, graduated retry ladder (L0-L4),
//!   rule-based retrieval evaluation, legal supplement, cross-domain rerank

pub mod bm25;
pub mod hybrid;
pub mod retrieval_agent;
pub mod vector_store;

pub use bm25::{Bm25Config, Bm25IndexTable, Bm25Result};
pub use hybrid::{HybridSearchConfig, HybridSearcher, DEFAULT_RRF_K, FETCH_MULTIPLIER, RERANK_POOL_MULTIPLIER};
pub use retrieval_agent::{
    contains_legal_citation, select_strategy, DocumentBudget, RetrievalAgent, RetrievalAgentConfig,
};
pub use vector_store::{MetadataMatch, QdrantVectorStore, VectorStoreConfig, VectorStoreFacade};
