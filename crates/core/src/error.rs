//! Error taxonomy for the pipeline
//!
//! Mirrors the per-crate error enums (`RagError`, `LlmError`, `ConfigError`)
//! the way `voice_agent_core::Error` used to absorb `RagError` in the
//! original workspace: each downstream crate keeps its own `thiserror` enum
//! and converts into this one at the crate boundary.

use thiserror::Error;

/// Errors produced anywhere in the retrieval/generation pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("classification failed: {0}")]
    Classification(String),

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("pipeline budget exhausted: {0}")]
    Budget(String),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("llm backend error: {0}")]
    Llm(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the workspace
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Retrieval("vector store unreachable".to_string());
        assert_eq!(err.to_string(), "retrieval failed: vector store unreachable");
    }
}
