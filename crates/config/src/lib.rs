//! Configuration for the domain-routed agentic RAG pipeline
//!
//! Loads settings from environment variables (§6), and exposes the
//! per-domain keyword/prompt tables that the classifier and generator
//! read at request time.

pub mod domain_profile;
pub mod prompts;
pub mod settings;

pub use domain_profile::{domain_profiles, CompoundRule, DomainProfile, DomainProfileTable, LEGAL_TRIGGER_TOKENS};
pub use prompts::{DomainPrompt, PromptTemplates, CORE_RULES_HEADER, PROMPT_INJECTION_GUARD};
pub use settings::{
    load_settings, BackendSettings, ClassifierMode, FeatureFlags, PipelineSettings,
    RetrievalSettings, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
