//! Response cache and the `StateGraph` orchestrator (components L12-L13)
//!
//! This crate owns nothing domain-specific: it wires the classifier,
//! decomposer, rewriter, retrieval agent, generator, and evaluator built in
//! `sme-rag-agent`/`sme-rag-rag` into the two request entry points the HTTP
//! veneer calls, `Router::process` and `Router::stream`.

pub mod cache;
pub mod context;
pub mod graph;

pub use cache::{cache_key, CachedResponse, ResponseCache};
pub use context::PipelineContext;
pub use graph::{to_user_message, Router};
