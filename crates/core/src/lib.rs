//! Core types shared across the domain-routed agentic RAG pipeline
//!
//! This crate has no I/O of its own: it defines the data model that
//! flows through the router (`RouterState` and its parts), the trait
//! seams pluggable backends implement, and the LLM wire types used by
//! every crate that talks to a chat model.

pub mod action;
pub mod classification;
pub mod document;
pub mod domain;
pub mod error;
pub mod evaluation;
pub mod event;
pub mod llm_types;
pub mod pii;
pub mod query;
pub mod retrieval;
pub mod router_state;
pub mod subquery;
pub mod traits;
pub mod turn;

pub use action::ActionSuggestion;
pub use classification::{ClassificationResult, ClassificationSource};
pub use document::{dedup_citations, dedup_documents, Document, MetaValue, SourceCitation, DEDUP_PREFIX_BYTES};
pub use domain::{sort_domains, Domain, EXPERT_DOMAINS, REJECTION_MESSAGE};
pub use error::{Error, Result};
pub use evaluation::{Criterion, EvaluationResult, DEFAULT_PASS_THRESHOLD, MIN_FAITHFULNESS};
pub use event::{DoneMetadata, StreamEvent};
pub use llm_types::{
    FinishReason, GenerateRequest, GenerateResponse, Message, Role, StreamChunk, TokenUsage,
    ToolCall, ToolDefinition,
};
pub use pii::{DetectionMethod, PIIEntity, PIISeverity, PIIType, RedactionStrategy};
pub use query::{Query, MAX_QUERY_CHARS};
pub use retrieval::{RetrievalResult, RetrievalStatus, RetryLevel, SearchStrategy};
pub use router_state::{Generation, QueryRewriteMeta, RouterState, StageError, Timings, TimeoutCause, UserContext};
pub use subquery::SubQuery;
pub use turn::{last_n, Turn, TurnRole};

pub use traits::{FilterOp, LanguageModel, MetadataFilter, RetrieveOptions, Retriever};
