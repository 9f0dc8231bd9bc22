//! Language Model traits

use async_trait::async_trait;
use std::pin::Pin;
use futures::Stream;
use crate::{Result, GenerateRequest, GenerateResponse, StreamChunk, ToolDefinition};

/// Language Model interface
///
/// Implementations:
/// - `ChatLlmClient` - Ollama/OpenAI-compatible chat backend
///
/// # Example
///
/// ```ignore
/// let llm: Box<dyn LanguageModel> = Box::new(ChatLlmClient::new(config)?);
/// let request = GenerateRequest::new("당신은 소상공인 컨설팅 전문가입니다")
///     .with_user_message("부가세 신고 기한이 언제인가요?");
/// let response = llm.generate(request).await?;
/// println!("{}", response.text);
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Generate completion
    ///
    /// # Arguments
    /// * `request` - Generation request with messages, parameters
    ///
    /// # Returns
    /// Generated response with text and metadata
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Stream tokens as generated
    ///
    /// Lower latency than `generate()` as tokens are yielded incrementally.
    ///
    /// # Arguments
    /// * `request` - Generation request (will have `stream: true` set)
    ///
    /// # Returns
    /// Stream of text chunks
    fn generate_stream<'a>(
        &'a self,
        request: GenerateRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send + 'a>>;

    /// Generate with tool/function calling
    ///
    /// # Arguments
    /// * `request` - Generation request
    /// * `tools` - Available tool definitions
    ///
    /// # Returns
    /// Response which may include tool calls in addition to text
    async fn generate_with_tools(
        &self,
        request: GenerateRequest,
        tools: &[ToolDefinition],
    ) -> Result<GenerateResponse>;

    /// Check if model is available
    ///
    /// Returns false if model is not loaded or backend is unavailable.
    async fn is_available(&self) -> bool;

    /// Get model name for logging
    fn model_name(&self) -> &str;

    /// Get context window size in tokens
    fn context_size(&self) -> usize {
        4096 // Default, implementations should override
    }

    /// Estimate token count for text
    ///
    /// Uses a simple heuristic by default. Implementations may use
    /// actual tokenizers for more accurate counts.
    fn estimate_tokens(&self, text: &str) -> usize {
        // Rough estimate: Korean text tokenizes denser than English;
        // 3 chars per token is a reasonable blended default.
        text.chars().count() / 3
    }
}
