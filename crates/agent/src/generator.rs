//! Response generator (component L10, §4.9)
//!
//! Builds the final-answer prompt from one or more domains' retrieved
//! documents, generates the answer (synchronous or streamed), and
//! assembles the action suggestions and source citations that ride
//! alongside it. Single-domain queries use that domain's fixed prompt
//! template directly; multi-domain queries use the synthesis template
//! with a domain-labeled context section so the model writes one
//! coherent answer instead of concatenating per-domain answers (§4.9).

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};

use sme_rag_config::{PromptTemplates, PipelineSettings};
use sme_rag_core::{
    Document, Domain, GenerateRequest, LanguageModel, SourceCitation, StreamEvent,
};

use crate::actions;

/// Number of characters kept in a citation's `content_snippet`.
const CITATION_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub business_plan_max_tokens: u32,
    /// When set, actions are collected before the LLM call and hinted at
    /// in the prompt so the answer can reference them naturally (§4.9).
    /// When unset, actions are still surfaced in the response but never
    /// shown to the model.
    pub action_aware_generation: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let pipeline = PipelineSettings::default();
        Self {
            temperature: 0.3,
            max_tokens: pipeline.generation_max_tokens,
            business_plan_max_tokens: pipeline.business_plan_max_tokens,
            action_aware_generation: true,
        }
    }
}

/// One domain's retrieved documents, carried through to generation so the
/// multi-domain prompt can label each section and citations can be built
/// per-document.
pub struct DomainContext {
    pub domain: Domain,
    pub documents: Vec<Document>,
}

/// The assembled, non-streamed result of one generation call.
pub struct GeneratedAnswer {
    pub content: String,
    pub citations: Vec<SourceCitation>,
    pub actions: Vec<sme_rag_core::ActionSuggestion>,
}

pub struct ResponseGenerator {
    llm: Arc<dyn LanguageModel>,
    templates: PromptTemplates,
    config: GeneratorConfig,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, templates: PromptTemplates, config: GeneratorConfig) -> Self {
        Self { llm, templates, config }
    }

    /// Fixed refusal message, bypassing generation entirely for a
    /// rejection verdict (§4.5 rejection path, §4.9 "no LLM call").
    pub fn rejection_answer(&self) -> GeneratedAnswer {
        GeneratedAnswer {
            content: sme_rag_core::REJECTION_MESSAGE.to_string(),
            citations: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Non-streaming generation over one or more domains' retrieved
    /// context, returning the final answer plus actions and citations.
    pub async fn generate(
        &self,
        query: &str,
        history: &[sme_rag_core::Turn],
        contexts: &[DomainContext],
    ) -> sme_rag_core::Result<GeneratedAnswer> {
        let actions = self.collect_actions(query, contexts);
        let messages = self.build_messages(query, history, contexts, &actions);
        let max_tokens = self.max_tokens_for(query);
        let request = GenerateRequest {
            messages,
            temperature: Some(self.config.temperature),
            max_tokens: Some(max_tokens),
            ..Default::default()
        };
        let response = self.llm.generate(request).await?;

        let citations = self.collect_citations(contexts);

        Ok(GeneratedAnswer { content: response.text, citations, actions })
    }

    /// Streaming generation: emits `source*` events first, then `token+`
    /// events as the model streams, then `action*` events, then exactly
    /// one `done` event (§8 ordering invariant). The caller appends the
    /// terminal `done`/`error` event with domains and response time.
    pub fn generate_stream<'a>(
        &'a self,
        query: &str,
        history: &[sme_rag_core::Turn],
        contexts: &'a [DomainContext],
    ) -> Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'a>> {
        let actions = self.collect_actions(query, contexts);
        let messages = self.build_messages(query, history, contexts, &actions);
        let max_tokens = self.max_tokens_for(query);
        let request = GenerateRequest {
            messages,
            temperature: Some(self.config.temperature),
            max_tokens: Some(max_tokens),
            ..Default::default()
        };

        let citations = self.collect_citations(contexts);

        let source_events = citations.into_iter().map(StreamEvent::Source).collect::<Vec<_>>();
        let action_events = actions.into_iter().map(StreamEvent::Action).collect::<Vec<_>>();

        let token_stream = self.llm.generate_stream(request).filter_map(|chunk| async move {
            match chunk {
                Ok(chunk) if !chunk.delta.is_empty() => Some(StreamEvent::token(chunk.delta)),
                _ => None,
            }
        });

        let stream = futures::stream::iter(source_events)
            .chain(token_stream)
            .chain(futures::stream::iter(action_events));
        Box::pin(stream)
    }

    fn build_messages(
        &self,
        query: &str,
        history: &[sme_rag_core::Turn],
        contexts: &[DomainContext],
        actions: &[sme_rag_core::ActionSuggestion],
    ) -> Vec<sme_rag_core::Message> {
        use sme_rag_llm::PromptBuilder;

        let hinted_actions: &[sme_rag_core::ActionSuggestion] =
            if self.config.action_aware_generation { actions } else { &[] };

        if contexts.len() <= 1 {
            let domain = contexts.first().map(|c| c.domain).unwrap_or(Domain::General);
            let system = self
                .templates
                .get(domain)
                .map(|prompt| prompt.build())
                .unwrap_or_else(|| sme_rag_config::CORE_RULES_HEADER.to_string());
            let documents = contexts.first().map(|c| c.documents.as_slice()).unwrap_or(&[]);
            PromptBuilder::new(system)
                .with_context(documents)
                .with_action_hint(hinted_actions)
                .with_history(history)
                .user_message(query)
                .build()
        } else {
            let sections: Vec<(Domain, Vec<Document>)> =
                contexts.iter().map(|c| (c.domain, c.documents.clone())).collect();
            PromptBuilder::new(self.templates.multi_domain_synthesis_prompt.clone())
                .with_domain_context(&sections)
                .with_action_hint(hinted_actions)
                .with_history(history)
                .user_message(query)
                .build()
        }
    }

    /// Business-plan generation requests run with a far larger token
    /// budget than ordinary answers (§4.9).
    fn max_tokens_for(&self, query: &str) -> u32 {
        if query.contains("사업계획서") {
            self.config.business_plan_max_tokens
        } else {
            self.config.max_tokens
        }
    }

    fn collect_citations(&self, contexts: &[DomainContext]) -> Vec<SourceCitation> {
        let citations = contexts
            .iter()
            .flat_map(|c| c.documents.iter().map(|d| SourceCitation::from_document(d, CITATION_SNIPPET_CHARS)))
            .collect();
        sme_rag_core::dedup_citations(citations)
    }

    /// Action suggestions are collected per domain and deduplicated by
    /// `action_type`, since the same trigger keyword can fire in more than
    /// one domain's query text.
    fn collect_actions(&self, query: &str, contexts: &[DomainContext]) -> Vec<sme_rag_core::ActionSuggestion> {
        let mut seen = std::collections::HashSet::new();
        contexts
            .iter()
            .flat_map(|c| actions::suggest_actions(c.domain, query))
            .filter(|a| seen.insert(a.action_type.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sme_rag_core::{FinishReason, GenerateResponse, Result as CoreResult, StreamChunk};

    struct MockLlm(String);

    #[async_trait]
    impl LanguageModel for MockLlm {
        async fn generate(&self, _request: GenerateRequest) -> CoreResult<GenerateResponse> {
            Ok(GenerateResponse::text(self.0.clone()))
        }
        fn generate_stream<'a>(
            &'a self,
            _request: GenerateRequest,
        ) -> Pin<Box<dyn Stream<Item = CoreResult<StreamChunk>> + Send + 'a>> {
            let chunks = self.0.chars().map(|c| Ok(StreamChunk::text(c.to_string()))).collect::<Vec<_>>();
            Box::pin(futures::stream::iter(chunks).chain(futures::stream::once(async {
                Ok(StreamChunk::final_chunk(FinishReason::Stop))
            })))
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

    fn generator(response: &str) -> ResponseGenerator {
        ResponseGenerator::new(
            Arc::new(MockLlm(response.to_string())),
            PromptTemplates::default(),
            GeneratorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_single_domain_generation_returns_answer_and_citations() {
        let generator = generator("부가세는 매 분기 신고해야 합니다 [1]");
        let contexts = vec![DomainContext {
            domain: Domain::FinanceTax,
            documents: vec![Document::new("부가세 신고 안내").with_meta("source", "tax.md").with_meta("title", "부가세")],
        }];
        let answer = generator.generate("부가세 신고 기한", &[], &contexts).await.unwrap();
        assert!(answer.content.contains("분기"));
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].source_uri, "tax.md");
    }

    #[tokio::test]
    async fn test_multi_domain_generation_uses_synthesis_template() {
        let generator = generator("통합 답변입니다");
        let contexts = vec![
            DomainContext { domain: Domain::FinanceTax, documents: vec![Document::new("세무 문서")] },
            DomainContext { domain: Domain::HrLabor, documents: vec![Document::new("노무 문서")] },
        ];
        let answer = generator.generate("세금과 퇴직금 질문", &[], &contexts).await.unwrap();
        assert_eq!(answer.content, "통합 답변입니다");
        assert_eq!(answer.citations.len(), 2);
    }

    #[tokio::test]
    async fn test_business_plan_query_requests_larger_token_budget() {
        let generator = generator("사업계획서 초안입니다");
        assert_eq!(generator.max_tokens_for("사업계획서 작성 도와주세요"), 8192);
        assert_eq!(generator.max_tokens_for("부가세 신고 기한"), 1024);
    }

    #[tokio::test]
    async fn test_action_aware_generation_injects_hint_before_generation() {
        let generator = ResponseGenerator::new(
            Arc::new(MockLlm("답변".to_string())),
            PromptTemplates::default(),
            GeneratorConfig { action_aware_generation: true, ..GeneratorConfig::default() },
        );
        let contexts = vec![DomainContext { domain: Domain::HrLabor, documents: vec![] }];
        let messages = generator.build_messages(
            "근로계약서 작성 방법",
            &[],
            &contexts,
            &generator.collect_actions("근로계약서 작성 방법", &contexts),
        );
        assert!(messages.iter().any(|m| m.content.contains("이용 가능한 후속 작업")));
    }

    #[tokio::test]
    async fn test_action_aware_generation_disabled_omits_hint() {
        let generator = ResponseGenerator::new(
            Arc::new(MockLlm("답변".to_string())),
            PromptTemplates::default(),
            GeneratorConfig { action_aware_generation: false, ..GeneratorConfig::default() },
        );
        let contexts = vec![DomainContext { domain: Domain::HrLabor, documents: vec![] }];
        let messages = generator.build_messages(
            "근로계약서 작성 방법",
            &[],
            &contexts,
            &generator.collect_actions("근로계약서 작성 방법", &contexts),
        );
        assert!(!messages.iter().any(|m| m.content.contains("이용 가능한 후속 작업")));
    }

    #[tokio::test]
    async fn test_action_suggestions_deduplicated_across_domains() {
        let generator = generator("답변");
        let contexts = vec![
            DomainContext { domain: Domain::HrLabor, documents: vec![] },
            DomainContext { domain: Domain::LawCommon, documents: vec![] },
        ];
        let actions = generator.collect_actions("근로계약서 작성 방법", &contexts);
        assert_eq!(actions.iter().filter(|a| a.action_type == "generate_contract").count(), 1);
    }

    #[tokio::test]
    async fn test_stream_emits_sources_then_tokens_then_actions() {
        let generator = generator("안녕하세요");
        let contexts = vec![DomainContext {
            domain: Domain::FinanceTax,
            documents: vec![Document::new("문서").with_meta("source", "a.md")],
        }];
        let events: Vec<StreamEvent> = generator.generate_stream("세금계산서 발행", &[], &contexts).collect().await;
        let first_source = events.iter().position(|e| matches!(e, StreamEvent::Source(_)));
        let first_token = events.iter().position(|e| matches!(e, StreamEvent::Token { .. }));
        let first_action = events.iter().position(|e| matches!(e, StreamEvent::Action(_)));
        assert!(first_source.unwrap() < first_token.unwrap());
        assert!(first_token.unwrap() < first_action.unwrap());
    }
}
