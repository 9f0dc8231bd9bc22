//! Evaluator (component L11, §4.10)
//!
//! An LLM judge scores a generated answer against its supporting
//! documents on the five fixed criteria, returning a weighted-mean total
//! and a two-part pass verdict (total over threshold, faithfulness over
//! its own floor). Tolerant JSON parsing mirrors `classifier.rs`'s and
//! `decomposer.rs`'s brace-scanning approach to judge output, since a
//! model occasionally wraps its JSON in prose despite instructions.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use sme_rag_core::{Criterion, Document, EvaluationResult, GenerateRequest, LanguageModel, DEFAULT_PASS_THRESHOLD};

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub pass_threshold: f32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self { pass_threshold: DEFAULT_PASS_THRESHOLD }
    }
}

pub struct Evaluator {
    llm: Arc<dyn LanguageModel>,
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn LanguageModel>, config: EvaluatorConfig) -> Self {
        Self { llm, config }
    }

    /// Judge `answer` against the documents it was generated from.
    /// Any LLM failure or unparseable judge output falls back to
    /// `EvaluationResult::unparseable()`, which passes rather than
    /// triggering a retry storm (§4.10).
    pub async fn evaluate(&self, query: &str, answer: &str, documents: &[Document]) -> EvaluationResult {
        let request = self.build_request(query, answer, documents);
        let response = match self.llm.generate(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "evaluator LLM call failed");
                return EvaluationResult::unparseable();
            }
        };
        parse_evaluation(&response.text, self.config.pass_threshold).unwrap_or_else(|| {
            warn!("evaluator response was unparseable, passing by default");
            EvaluationResult::unparseable()
        })
    }

    fn build_request(&self, query: &str, answer: &str, documents: &[Document]) -> GenerateRequest {
        let context = documents
            .iter()
            .enumerate()
            .map(|(idx, doc)| format!("[{}] {}", idx + 1, doc.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let system = "당신은 답변 품질을 평가하는 심사자입니다. 아래 질문, 답변, 근거 문서를 보고 다음 5개 기준을 \
            각 0~10점으로 채점하세요: relevance(질문과의 관련성), faithfulness(근거 문서에 충실한 정도, 근거 없는 \
            내용은 감점), completeness(누락 없이 충분히 답했는지), clarity(이해하기 쉬운지), \
            citation_discipline(인용 표기가 올바른지). 다른 설명 없이 다음 JSON 형식으로만 답하세요: \
            {\"scores\": {\"relevance\": 0, \"faithfulness\": 0, \"completeness\": 0, \"clarity\": 0, \"citation_discipline\": 0}, \"feedback\": \"...\"}"
            .to_string();
        GenerateRequest::new(system)
            .with_user_message(format!("## 질문\n{query}\n\n## 근거 문서\n{context}\n\n## 답변\n{answer}"))
            .with_temperature(0.0)
            .with_max_tokens(400)
    }
}

fn parse_evaluation(text: &str, threshold: f32) -> Option<EvaluationResult> {
    let json_start = text.find('{')?;
    let json_end = text.rfind('}')?;
    let value: serde_json::Value = serde_json::from_str(&text[json_start..=json_end]).ok()?;
    let raw_scores = value.get("scores")?.as_object()?;

    let mut scores: HashMap<Criterion, f32> = HashMap::new();
    for criterion in Criterion::ALL {
        if let Some(score) = raw_scores.get(criterion_key(criterion)).and_then(|v| v.as_f64()) {
            scores.insert(criterion, score as f32);
        }
    }
    if scores.is_empty() {
        return None;
    }

    let feedback = value.get("feedback").and_then(|v| v.as_str()).map(|s| s.to_string());
    Some(EvaluationResult::from_scores(scores, feedback, threshold))
}

fn criterion_key(criterion: Criterion) -> &'static str {
    match criterion {
        Criterion::Relevance => "relevance",
        Criterion::Faithfulness => "faithfulness",
        Criterion::Completeness => "completeness",
        Criterion::Clarity => "clarity",
        Criterion::CitationDiscipline => "citation_discipline",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sme_rag_core::{GenerateResponse, Result as CoreResult, StreamChunk};
    use std::pin::Pin;

    struct MockLlm(String);

    #[async_trait]
    impl LanguageModel for MockLlm {
        async fn generate(&self, _request: GenerateRequest) -> CoreResult<GenerateResponse> {
            Ok(GenerateResponse::text(self.0.clone()))
        }
        fn generate_stream<'a>(
            &'a self,
            _request: GenerateRequest,
        ) -> Pin<Box<dyn futures::Stream<Item = CoreResult<StreamChunk>> + Send + 'a>> {
            Box::pin(futures::stream::empty())
        }
        async fn generate_with_tools(
            &self,
            request: GenerateRequest,
            _tools: &[sme_rag_core::ToolDefinition],
        ) -> CoreResult<GenerateResponse> {
            self.generate(request).await
        }
        async fn is_available(&self) -> bool {
            true
        }
        fn model_name(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_evaluate_parses_scores_and_passes() {
        let response = r#"{"scores": {"relevance": 8, "faithfulness": 8, "completeness": 7, "clarity": 8, "citation_discipline": 7}, "feedback": "good"}"#;
        let evaluator = Evaluator::new(Arc::new(MockLlm(response.to_string())), EvaluatorConfig::default());
        let result = evaluator.evaluate("부가세 신고 기한", "매 분기 신고합니다 [1]", &[Document::new("부가세는 분기별로 신고한다")]).await;
        assert!(result.passed);
        assert_eq!(result.feedback.as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn test_evaluate_fails_on_low_faithfulness() {
        let response = r#"{"scores": {"relevance": 9, "faithfulness": 2, "completeness": 8, "clarity": 8, "citation_discipline": 7}}"#;
        let evaluator = Evaluator::new(Arc::new(MockLlm(response.to_string())), EvaluatorConfig::default());
        let result = evaluator.evaluate("질문", "근거 없는 답변", &[]).await;
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn test_unparseable_response_passes_by_default() {
        let evaluator = Evaluator::new(Arc::new(MockLlm("이것은 JSON이 아닙니다".to_string())), EvaluatorConfig::default());
        let result = evaluator.evaluate("질문", "답변", &[]).await;
        assert!(result.passed);
        assert_eq!(result.feedback.as_deref(), Some("unparseable"));
    }

    #[test]
    fn test_parse_evaluation_missing_scores_key_returns_none() {
        assert!(parse_evaluation(r#"{"feedback": "x"}"#, DEFAULT_PASS_THRESHOLD).is_none());
    }
}
