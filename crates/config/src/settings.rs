//! Environment-driven pipeline settings (§6)
//!
//! Mirrors the teacher's `config::Config` + serde-default idiom (see
//! `AgentConfig`/`GoldLoanConfig`) but loads from environment variables
//! via the `config` crate's `Environment` source instead of YAML, since
//! the spec's configuration surface is exclusively env-driven.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Which classifier path runs first (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    Hybrid,
    LlmOnly,
}

impl Default for ClassifierMode {
    fn default() -> Self {
        ClassifierMode::Hybrid
    }
}

/// Feature toggles, one per `ENABLE_*` environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default = "default_true")]
    pub hybrid_search: bool,
    #[serde(default = "default_true")]
    pub reranking: bool,
    #[serde(default = "default_true")]
    pub cross_domain_rerank: bool,
    #[serde(default = "default_true")]
    pub legal_supplement: bool,
    #[serde(default = "default_true")]
    pub adaptive_search: bool,
    #[serde(default = "default_true")]
    pub post_eval_retry: bool,
    #[serde(default = "default_true")]
    pub response_cache: bool,
    #[serde(default = "default_true")]
    pub action_aware_generation: bool,
    #[serde(default = "default_false")]
    pub integrated_generation: bool,
}

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            hybrid_search: true,
            reranking: true,
            cross_domain_rerank: true,
            legal_supplement: true,
            adaptive_search: true,
            post_eval_retry: true,
            response_cache: true,
            action_aware_generation: true,
            integrated_generation: false,
        }
    }
}

/// Retrieval and pipeline-budget knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,
    #[serde(default = "default_max_retrieval_docs")]
    pub max_retrieval_docs: usize,
    #[serde(default = "default_max_retry_level")]
    pub max_retry_level: u8,
    #[serde(default = "default_max_legal_supplement")]
    pub max_legal_supplement: usize,
    #[serde(default = "default_rejection_vector_threshold")]
    pub rejection_vector_threshold: f32,
    #[serde(default = "default_multi_domain_gap")]
    pub multi_domain_gap: f32,
    #[serde(default = "default_min_domain_k")]
    pub min_domain_k: usize,
}

fn default_retrieval_k() -> usize {
    6
}
fn default_max_retrieval_docs() -> usize {
    12
}
fn default_max_retry_level() -> u8 {
    4
}
fn default_max_legal_supplement() -> usize {
    3
}
fn default_rejection_vector_threshold() -> f32 {
    0.35
}
fn default_multi_domain_gap() -> f32 {
    0.1
}
fn default_min_domain_k() -> usize {
    2
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            retrieval_k: default_retrieval_k(),
            max_retrieval_docs: default_max_retrieval_docs(),
            max_retry_level: default_max_retry_level(),
            max_legal_supplement: default_max_legal_supplement(),
            rejection_vector_threshold: default_rejection_vector_threshold(),
            multi_domain_gap: default_multi_domain_gap(),
            min_domain_k: default_min_domain_k(),
        }
    }
}

/// Timeouts and generation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_pipeline_total_timeout")]
    pub pipeline_total_timeout_secs: u64,
    #[serde(default = "default_generation_max_tokens")]
    pub generation_max_tokens: u32,
    #[serde(default = "default_business_plan_max_tokens")]
    pub business_plan_max_tokens: u32,
}

fn default_pipeline_total_timeout() -> u64 {
    120
}
fn default_generation_max_tokens() -> u32 {
    1024
}
fn default_business_plan_max_tokens() -> u32 {
    8192
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            pipeline_total_timeout_secs: default_pipeline_total_timeout(),
            generation_max_tokens: default_generation_max_tokens(),
            business_plan_max_tokens: default_business_plan_max_tokens(),
        }
    }
}

/// External backend endpoints and model identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default = "default_vector_store_url")]
    pub vector_store_url: String,
    #[serde(default = "default_embedding_model_id")]
    pub embedding_model_id: String,
    #[serde(default = "default_reranker_model_id")]
    pub reranker_model_id: String,
    #[serde(default = "default_llm_model_id")]
    pub llm_model_id: String,
}

fn default_vector_store_url() -> String {
    "http://localhost:6334".to_string()
}
fn default_embedding_model_id() -> String {
    "bge-m3".to_string()
}
fn default_reranker_model_id() -> String {
    "bge-reranker-v2-m3".to_string()
}
fn default_llm_model_id() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            vector_store_url: default_vector_store_url(),
            embedding_model_id: default_embedding_model_id(),
            reranker_model_id: default_reranker_model_id(),
            llm_model_id: default_llm_model_id(),
        }
    }
}

/// HTTP server bind address and request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// Top-level settings aggregate, loaded once at process start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub classifier_mode: ClassifierMode,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Load settings from process environment variables, falling back to
/// spec-documented defaults for anything unset.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::Environment::default().try_parsing(true))
        .build()?;

    // Individual env vars may be absent; `config::Environment` only
    // supplies what's present, so deserializing into a struct whose
    // fields all carry serde defaults yields the documented defaults.
    builder.try_deserialize::<Settings>().or_else(|_| Ok(Settings::default()))
}
