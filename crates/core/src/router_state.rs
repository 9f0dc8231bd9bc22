//! `RouterState` — the append-only record threaded through the pipeline
//!
//! One instance is created per incoming request, lives for the request
//! only, and is either returned to the caller, persisted by an external
//! collaborator, or discarded on a cache hit (§3 Lifecycle). No field is
//! mutated after the stage that produced it, except `retry_count` and
//! `retrieval_results` on graduated retry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::action::ActionSuggestion;
use crate::classification::ClassificationResult;
use crate::document::SourceCitation;
use crate::evaluation::EvaluationResult;
use crate::retrieval::RetrievalResult;
use crate::subquery::SubQuery;
use crate::turn::Turn;

/// Why the pipeline returned early with a partial result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutCause {
    QuestionTimeout,
    PipelineTotalTimeout,
    RuntimeError,
}

/// One error captured at a node boundary (§7 propagation policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    pub stage: String,
    pub kind: String,
    pub message: String,
}

/// Per-stage elapsed time, in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timings(pub HashMap<String, u64>);

impl Timings {
    pub fn record(&mut self, stage: impl Into<String>, elapsed: Duration) {
        self.0.insert(stage.into(), elapsed.as_millis() as u64);
    }

    pub fn total_ms(&self) -> u64 {
        self.0.values().sum()
    }
}

/// Metadata about whether/why the query rewriter fired (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRewriteMeta {
    pub applied: bool,
    pub reason: String,
    pub time_ms: u64,
}

/// The final generated answer plus its action hints and citations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Generation {
    pub content: String,
    pub actions: Vec<ActionSuggestion>,
    pub sources: Vec<SourceCitation>,
}

/// Caller-supplied company profile context (opaque to the router itself).
pub type UserContext = HashMap<String, serde_json::Value>;

/// The per-request cooperative state record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterState {
    pub query: String,
    pub sanitized_query: String,
    pub was_sanitized: bool,
    pub history: Vec<Turn>,
    pub user_context: Option<UserContext>,

    pub classification: Option<ClassificationResult>,
    pub sub_queries: Vec<SubQuery>,
    pub retrieval_results: Vec<RetrievalResult>,
    pub generation: Option<Generation>,
    pub evaluation: Option<EvaluationResult>,

    pub retry_count: u32,
    pub timings: Timings,
    pub timeout_cause: Option<TimeoutCause>,
    pub query_rewrite: Option<QueryRewriteMeta>,
    pub errors: Vec<StageError>,
}

impl RouterState {
    /// Create the initial state for a new request, before sanitization.
    pub fn new(query: impl Into<String>, history: Vec<Turn>, user_context: Option<UserContext>) -> Self {
        let query = query.into();
        Self {
            sanitized_query: query.clone(),
            query,
            was_sanitized: false,
            history,
            user_context,
            classification: None,
            sub_queries: Vec::new(),
            retrieval_results: Vec::new(),
            generation: None,
            evaluation: None,
            retry_count: 0,
            timings: Timings::default(),
            timeout_cause: None,
            query_rewrite: None,
            errors: Vec::new(),
        }
    }

    pub fn push_error(&mut self, stage: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) {
        self.errors.push(StageError {
            stage: stage.into(),
            kind: kind.into(),
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_mirrors_query_until_sanitized() {
        let state = RouterState::new("부가세 신고", vec![], None);
        assert_eq!(state.query, state.sanitized_query);
        assert!(!state.was_sanitized);
        assert_eq!(state.retry_count, 0);
    }

    #[test]
    fn test_timings_total() {
        let mut timings = Timings::default();
        timings.record("classify", Duration::from_millis(10));
        timings.record("retrieve", Duration::from_millis(25));
        assert_eq!(timings.total_ms(), 35);
    }
}
