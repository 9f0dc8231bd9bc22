//! Chat LLM client: the single `LLM_MODEL_ID` backend used by the
//! classifier, decomposer, rewriter, generator, and evaluator.
//!
//! Adapted from the teacher's `OllamaBackend` (exponential-backoff retry
//! over an Ollama-compatible `/api/chat` endpoint), generalized to
//! implement `sme_rag_core::LanguageModel` directly against the core
//! `GenerateRequest`/`GenerateResponse` types instead of a crate-local
//! message type, and to record `TokenUsage` on every response.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use sme_rag_core::{
    FinishReason, GenerateRequest, GenerateResponse, LanguageModel, Message, Result, Role,
    StreamChunk, ToolDefinition, TokenUsage,
};

use crate::LlmError;

/// Connection and retry configuration for the chat LLM client.
#[derive(Debug, Clone)]
pub struct ChatLlmConfig {
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for ChatLlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Chat LLM client, thread-safe and reference-counted at the process level
/// (§5: "process-singleton, thread-safe, reference-counted").
#[derive(Clone)]
pub struct ChatLlmClient {
    client: Client,
    config: ChatLlmConfig,
}

impl ChatLlmClient {
    pub fn new(config: ChatLlmConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout);
        if let Some(ref key) = config.api_key {
            let mut headers = reqwest::header::HeaderMap::new();
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| LlmError::Configuration(e.to_string()))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }
        let client = builder.build().map_err(|e| LlmError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }

    fn is_retryable(err: &LlmError) -> bool {
        matches!(err, LlmError::Network(_) | LlmError::Timeout)
    }

    async fn execute(&self, request: &ChatRequestBody) -> std::result::Result<ChatResponseBody, LlmError> {
        let response = self.client.post(self.api_url("/chat")).json(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("server error {status}: {body}")));
            }
            return Err(LlmError::Api(body));
        }
        response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LanguageModel for ChatLlmClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let body = ChatRequestBody {
            model: request.model.clone().unwrap_or_else(|| self.config.model.clone()),
            messages: request.messages.iter().map(ChatMessageBody::from).collect(),
            stream: false,
            options: ChatOptions {
                temperature: request.temperature,
                top_p: request.top_p,
                num_predict: request.max_tokens.map(|t| t as i32),
            },
        };

        let mut backoff = self.config.initial_backoff;
        let mut last_err = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(attempt, ?backoff, "chat llm request retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            match self.execute(&body).await {
                Ok(response) => {
                    let prompt_tokens: u32 =
                        request.messages.iter().map(|m| self.estimate_tokens(&m.content) as u32).sum();
                    let completion_tokens = self.estimate_tokens(&response.message.content) as u32;
                    return Ok(GenerateResponse {
                        text: response.message.content,
                        finish_reason: if response.done { FinishReason::Stop } else { FinishReason::Length },
                        usage: Some(TokenUsage::new(prompt_tokens, completion_tokens)),
                        tool_calls: Vec::new(),
                    });
                }
                Err(e) if Self::is_retryable(&e) => last_err = Some(e),
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err.unwrap_or_else(|| LlmError::Network("max retries exceeded".into())).into())
    }

    fn generate_stream<'a>(
        &'a self,
        request: GenerateRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send + 'a>> {
        let body = ChatRequestBody {
            model: request.model.clone().unwrap_or_else(|| self.config.model.clone()),
            messages: request.messages.iter().map(ChatMessageBody::from).collect(),
            stream: true,
            options: ChatOptions {
                temperature: request.temperature,
                top_p: request.top_p,
                num_predict: request.max_tokens.map(|t| t as i32),
            },
        };

        let stream = async_stream::try_stream! {
            let response = self.client.post(self.api_url("/chat")).json(&body).send().await
                .map_err(LlmError::from)?;
            if !response.status().is_success() {
                let text = response.text().await.unwrap_or_default();
                Err(LlmError::Api(text))?;
            }
            let mut bytes = response.bytes_stream();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(LlmError::from)?;
                let text = String::from_utf8_lossy(&chunk);
                for line in text.lines() {
                    if line.is_empty() {
                        continue;
                    }
                    if let Ok(parsed) = serde_json::from_str::<ChatStreamBody>(line) {
                        if !parsed.message.content.is_empty() {
                            yield StreamChunk::text(parsed.message.content);
                        }
                        if parsed.done {
                            yield StreamChunk::final_chunk(FinishReason::Stop);
                        }
                    }
                }
            }
        };
        Box::pin(stream.map(|r: std::result::Result<StreamChunk, LlmError>| r.map_err(Into::into)))
    }

    async fn generate_with_tools(
        &self,
        request: GenerateRequest,
        _tools: &[ToolDefinition],
    ) -> Result<GenerateResponse> {
        // The router's stages never issue tool calls; delegate to plain generation.
        self.generate(request).await
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.config.endpoint))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        // Korean text runs roughly 2 chars/token under most BPE tokenizers.
        (text.chars().count() / 2).max(1)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequestBody {
    model: String,
    messages: Vec<ChatMessageBody>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessageBody {
    role: String,
    content: String,
}

impl From<&Message> for ChatMessageBody {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        Self { role: role.to_string(), content: msg.content.clone() }
    }
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    message: ChatMessageBody,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ChatStreamBody {
    message: ChatMessageBody,
    #[serde(default)]
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChatLlmConfig::default();
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_token_estimate_floor_is_one() {
        let client = ChatLlmClient::new(ChatLlmConfig::default()).unwrap();
        assert_eq!(client.estimate_tokens(""), 1);
        assert!(client.estimate_tokens("부가세 신고 기한") > 1);
    }
}
