//! Router (component L13, §4.12) — the `StateGraph` orchestrator
//!
//! ```text
//! classify -> [rejection? -> terminal_refusal]
//!          -> decompose -> retrieve_all -> generate -> evaluate -> [retry? -> retrieve_all] -> return
//! ```
//!
//! Each node is modeled as an async function over `RouterState` that
//! writes exactly one state field group, honoring a shrinking
//! `remaining_budget` (§4.12 "Node contracts"). `process` builds the
//! final `RouterState`; `stream` mirrors the same stage sequence but
//! switches generation to `astream_generate` and skips the evaluator
//! (§4.12 "Stream mode", §9 "Streaming skips evaluator").
//!
//! Cache placement: §2's prose places "cache check" before "classify" in
//! the data-flow summary, but §4.11's cache key is defined over
//! `sorted(domains)`, which only exists after classification runs. We
//! resolve this the only way that type-checks: classify first (cheap,
//! no LLM call in the hybrid path's common case), then probe the cache
//! with the classified domain set before paying for decompose/retrieve/
//! generate/evaluate. Recorded as an Open Question resolution in
//! DESIGN.md.

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};

use sme_rag_core::{
    sort_domains, Domain, Error, Generation, Query, RetryLevel, RouterState, StreamEvent, TimeoutCause, Turn,
    UserContext,
};

use crate::cache::CachedResponse;
use crate::context::PipelineContext;

const GENERATION_FALLBACK_MESSAGE: &str = "일시적으로 답변을 생성할 수 없습니다.";
const SYSTEM_ERROR_MESSAGE: &str = "일시적 오류가 발생했습니다. 잠시 후 다시 시도해 주세요.";

/// The top-level orchestrator. Stateless itself; all shared state lives
/// in the `PipelineContext` it holds by reference.
pub struct Router {
    ctx: Arc<PipelineContext>,
}

impl Router {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Non-streaming entry point (§4.12 `process`).
    pub async fn process(&self, query: impl Into<String>, history: Vec<Turn>, user_context: Option<UserContext>) -> RouterState {
        let start = Instant::now();
        let raw_query = query.into();
        let deadline = start + Duration::from_secs(self.ctx.settings.pipeline.pipeline_total_timeout_secs);

        let mut state = RouterState::new(raw_query.clone(), history, user_context);

        let validated = match Query::new(&raw_query) {
            Ok(q) => q,
            Err(e) => {
                state.push_error("input", "input_error", e.to_string());
                state.generation = Some(fallback_generation(&e.to_string()));
                return state;
            }
        };

        let sanitized = sme_rag_text::sanitize(validated.as_str());
        state.sanitized_query = sanitized.masked_text.clone();
        state.was_sanitized = sanitized.was_modified;
        tracing::info!(query = %sme_rag_text::mask_for_logging(&state.sanitized_query), "processing request");

        let rewrite_start = Instant::now();
        let (query_for_pipeline, rewrite_meta) = self.ctx.rewriter.rewrite(&state.sanitized_query, &state.history).await;
        state.timings.record("rewrite", rewrite_start.elapsed());
        state.query_rewrite = Some(rewrite_meta);

        let classify_start = Instant::now();
        let remaining = remaining_budget(deadline);
        let classification = match tokio::time::timeout(remaining, self.ctx.classifier.classify(&query_for_pipeline)).await {
            Ok(result) => result,
            Err(_) => {
                return self.timeout_state(state, TimeoutCause::PipelineTotalTimeout);
            }
        };
        state.timings.record("classify", classify_start.elapsed());

        if classification.is_rejection {
            let rejection = self.ctx.generator.rejection_answer();
            state.generation = Some(Generation { content: rejection.content, actions: rejection.actions, sources: rejection.citations });
            state.classification = Some(classification);
            return state;
        }

        let routing_domains = sort_domains(classification.domains.iter().map(|d| d.routing_domain()).collect());
        state.classification = Some(classification);

        if self.ctx.settings.features.response_cache {
            if let Some(cached) = self.ctx.response_cache.get(&state.sanitized_query, &routing_domains, &state.history) {
                state.generation = Some(cached.generation);
                state.evaluation = cached.evaluation;
                state.timings.record("cache_hit", Duration::from_millis(0));
                return state;
            }
        }

        let decompose_start = Instant::now();
        let remaining = remaining_budget(deadline);
        state.sub_queries = match tokio::time::timeout(
            remaining,
            self.ctx.decomposer.decompose(&query_for_pipeline, &routing_domains),
        )
        .await
        {
            Ok(sub_queries) => sub_queries,
            Err(_) => return self.timeout_state(state, TimeoutCause::PipelineTotalTimeout),
        };
        state.timings.record("decompose", decompose_start.elapsed());

        let mut retrieval_floors = vec![RetryLevel::L0Initial; state.sub_queries.len()];
        loop {
            let retrieve_start = Instant::now();
            let remaining = remaining_budget(deadline);
            if remaining.is_zero() {
                return self.timeout_state(state, TimeoutCause::PipelineTotalTimeout);
            }
            state.retrieval_results = self.retrieve_all(&state.sub_queries, &query_for_pipeline, remaining, &retrieval_floors).await;
            // Carry each sub-query's landed level forward so a post-eval
            // retry continues climbing the ladder instead of restarting it.
            retrieval_floors = state
                .retrieval_results
                .iter()
                .map(|r| r.retry_level.next().unwrap_or(RetryLevel::L4Partial))
                .collect();
            if self.ctx.settings.features.cross_domain_rerank {
                state.retrieval_results = self.ctx.retrieval_agent.cross_domain_rerank(state.retrieval_results, &query_for_pipeline).await;
            }
            state.timings.record("retrieve", retrieve_start.elapsed());

            let generate_start = Instant::now();
            let contexts = build_contexts(&state.retrieval_results);
            let remaining = remaining_budget(deadline);
            let generated = match tokio::time::timeout(
                remaining,
                self.ctx.generator.generate(&query_for_pipeline, &state.history, &contexts),
            )
            .await
            {
                Ok(Ok(answer)) => answer,
                Ok(Err(e)) => {
                    state.push_error("generate", "generation_error", e.to_string());
                    state.generation = Some(generation_error_fallback(&state.retrieval_results));
                    return state;
                }
                Err(_) => return self.timeout_state(state, TimeoutCause::PipelineTotalTimeout),
            };
            state.timings.record("generate", generate_start.elapsed());
            state.generation = Some(Generation { content: generated.content.clone(), actions: generated.actions, sources: generated.citations });

            let evaluate_start = Instant::now();
            // Preserved defect (see DESIGN.md Open Questions): only the
            // first domain's retrieved documents are handed to the judge,
            // not the union across domains.
            let evaluation_data: &[sme_rag_core::Document] =
                state.retrieval_results.first().map(|r| r.documents.as_slice()).unwrap_or(&[]);
            let remaining = remaining_budget(deadline);
            let evaluation = match tokio::time::timeout(
                remaining,
                self.ctx.evaluator.evaluate(&query_for_pipeline, &generated.content, evaluation_data),
            )
            .await
            {
                Ok(evaluation) => evaluation,
                Err(_) => return self.timeout_state(state, TimeoutCause::PipelineTotalTimeout),
            };
            state.timings.record("evaluate", evaluate_start.elapsed());
            let passed = evaluation.passed;
            state.evaluation = Some(evaluation);

            let ladder_exhausted = state
                .retrieval_results
                .iter()
                .all(|r| r.retry_level.as_u8() >= RetryLevel::L4Partial.as_u8());
            let should_retry = !passed
                && self.ctx.settings.features.post_eval_retry
                && state.retry_count < self.ctx.settings.retrieval.max_retry_level as u32
                && !ladder_exhausted;
            if !should_retry {
                break;
            }
            state.retry_count += 1;
        }

        if self.ctx.settings.features.response_cache {
            if let (Some(generation), evaluation) = (state.generation.clone(), state.evaluation.clone()) {
                self.ctx.response_cache.put(
                    &state.sanitized_query,
                    &routing_domains,
                    &state.history,
                    CachedResponse { domains: routing_domains.clone(), generation, evaluation },
                );
            }
        }

        state
    }

    /// Streaming entry point (§4.12 `stream`). Mirrors `process` up to
    /// generation; the evaluator does not run since tokens are already
    /// committed to the caller once emitted (§9 known limitation).
    pub fn stream<'a>(
        &'a self,
        query: impl Into<String> + 'a,
        history: Vec<Turn>,
        user_context: Option<UserContext>,
    ) -> Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'a>> {
        let start = Instant::now();
        Box::pin(async_stream::stream! {
            let raw_query = query.into();
            let validated = match Query::new(&raw_query) {
                Ok(q) => q,
                Err(e) => {
                    yield StreamEvent::error(e.to_string());
                    return;
                }
            };

            let sanitized = sme_rag_text::sanitize(validated.as_str());
            let (query_for_pipeline, _rewrite_meta) = self.ctx.rewriter.rewrite(&sanitized.masked_text, &history).await;

            let classification = self.ctx.classifier.classify(&query_for_pipeline).await;
            if classification.is_rejection {
                yield StreamEvent::token(sme_rag_core::REJECTION_MESSAGE);
                yield StreamEvent::done(vec![Domain::Rejection], start.elapsed().as_millis() as u64);
                return;
            }

            let routing_domains = sort_domains(classification.domains.iter().map(|d| d.routing_domain()).collect());

            if self.ctx.settings.features.response_cache {
                if let Some(cached) = self.ctx.response_cache.get(&sanitized.masked_text, &routing_domains, &history) {
                    for source in cached.generation.sources {
                        yield StreamEvent::Source(source);
                    }
                    for word in cached.generation.content.split_inclusive(' ') {
                        yield StreamEvent::token(word);
                    }
                    for action in cached.generation.actions {
                        yield StreamEvent::Action(action);
                    }
                    yield StreamEvent::done(routing_domains, start.elapsed().as_millis() as u64);
                    return;
                }
            }

            tracing::info!(query = %sme_rag_text::mask_for_logging(&sanitized.masked_text), "streaming request");

            let sub_queries = self.ctx.decomposer.decompose(&query_for_pipeline, &routing_domains).await;
            let budget = Duration::from_secs(self.ctx.settings.pipeline.pipeline_total_timeout_secs);
            let floors = vec![RetryLevel::L0Initial; sub_queries.len()];
            let mut retrieval_results = self.retrieve_all(&sub_queries, &query_for_pipeline, budget, &floors).await;
            if self.ctx.settings.features.cross_domain_rerank {
                retrieval_results = self.ctx.retrieval_agent.cross_domain_rerank(retrieval_results, &query_for_pipeline).await;
            }

            let contexts = build_contexts(&retrieval_results);
            let mut token_stream = self.ctx.generator.generate_stream(&query_for_pipeline, &history, &contexts);
            while let Some(event) = token_stream.next().await {
                yield event;
            }

            yield StreamEvent::done(routing_domains, start.elapsed().as_millis() as u64);
        })
    }

    /// `retrieve_all`: per-sub-query retrievals run concurrently via a
    /// structured task group (§4.12 "Concurrency"); a failed task degrades
    /// to an `empty` result rather than cancelling its peers, which falls
    /// out naturally here since `RetrievalAgent::retrieve` never returns
    /// `Err` — backend failures are already absorbed into empty pools by
    /// the hybrid searcher (§4.8).
    async fn retrieve_all(
        &self,
        sub_queries: &[sme_rag_core::SubQuery],
        original_query: &str,
        budget: Duration,
        floors: &[RetryLevel],
    ) -> Vec<sme_rag_core::RetrievalResult> {
        let futures = sub_queries.iter().zip(floors.iter()).map(|(sub_query, &floor)| {
            self.ctx.retrieval_agent.retrieve(sub_query, original_query, budget, floor)
        });
        futures::future::join_all(futures).await
    }

    fn timeout_state(&self, mut state: RouterState, cause: TimeoutCause) -> RouterState {
        state.timeout_cause = Some(cause);
        state.push_error("pipeline", "budget_exceeded", "global pipeline timeout exhausted");
        if state.generation.is_none() {
            state.generation = Some(fallback_generation("응답 지연으로 인해 일부 결과만 제공됩니다."));
        }
        state
    }
}

fn remaining_budget(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn build_contexts(results: &[sme_rag_core::RetrievalResult]) -> Vec<sme_rag_agent::DomainContext> {
    results
        .iter()
        .map(|r| sme_rag_agent::DomainContext { domain: r.domain, documents: r.documents.clone() })
        .collect()
}

fn fallback_generation(message: &str) -> Generation {
    Generation { content: message.to_string(), actions: Vec::new(), sources: Vec::new() }
}

fn generation_error_fallback(results: &[sme_rag_core::RetrievalResult]) -> Generation {
    let sources = sme_rag_core::dedup_citations(
        results
            .iter()
            .flat_map(|r| r.documents.iter().map(|d| sme_rag_core::SourceCitation::from_document(d, 200)))
            .collect(),
    );
    Generation { content: GENERATION_FALLBACK_MESSAGE.to_string(), actions: Vec::new(), sources }
}

/// Map any infrastructure error into the catch-all system-error message
/// a caller is allowed to see raw (§7 "the only errors that surface raw to
/// the caller are InputError and the catch-all"). Not currently reached
/// from `process`/`stream` since every node already degrades in place;
/// kept as the seam the HTTP veneer calls if a node ever does propagate.
pub fn to_user_message(err: &Error) -> String {
    match err {
        Error::Input(msg) => msg.clone(),
        _ => SYSTEM_ERROR_MESSAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::stream::BoxStream;

    use sme_rag_agent::{
        ClassifierConfig, DecomposerConfig, DomainClassifier, Evaluator, EvaluatorConfig,
        GeneratorConfig, QuestionDecomposer, QueryRewriter, ResponseGenerator, RewriterConfig,
    };
    use sme_rag_config::{PromptTemplates, Settings};
    use sme_rag_core::{
        Document, FinishReason, GenerateRequest, GenerateResponse, LanguageModel, Result as CoreResult,
        StreamChunk, ToolDefinition,
    };
    use sme_rag_llm::{EmbeddingClient, RerankClient};
    use sme_rag_rag::{
        Bm25Config, Bm25IndexTable, HybridSearchConfig, HybridSearcher, MetadataMatch, RetrievalAgent,
        RetrievalAgentConfig, VectorStoreFacade,
    };

    /// Text shared across every canned document so a sub-query built only
    /// from its words always hits the `>=0.3` keyword-match floor.
    const CANNED_CONTENT: &str =
        "부가세 신고 기한 안내 근로계약서 퇴직금 계산 세무 처리 문서입니다";

    /// Returns a fixed reply (or, via `generate_calls`, alternates between
    /// two replies across calls) regardless of the request it receives.
    struct StubLlm {
        first: String,
        subsequent: Option<String>,
        calls: AtomicUsize,
    }

    impl StubLlm {
        fn fixed(reply: impl Into<String>) -> Arc<Self> {
            Arc::new(Self { first: reply.into(), subsequent: None, calls: AtomicUsize::new(0) })
        }

        fn then(first: impl Into<String>, subsequent: impl Into<String>) -> Arc<Self> {
            Arc::new(Self { first: first.into(), subsequent: Some(subsequent.into()), calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl LanguageModel for StubLlm {
        async fn generate(&self, _request: GenerateRequest) -> CoreResult<GenerateResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = if call == 0 { &self.first } else { self.subsequent.as_ref().unwrap_or(&self.first) };
            Ok(GenerateResponse::text(reply.clone()))
        }
        fn generate_stream<'a>(&'a self, _request: GenerateRequest) -> BoxStream<'a, CoreResult<StreamChunk>> {
            let reply = self.first.clone();
            let chunks = reply.chars().map(|c| Ok(StreamChunk::text(c.to_string()))).collect::<Vec<_>>();
            Box::pin(futures::stream::iter(chunks).chain(futures::stream::once(async {
                Ok(StreamChunk::final_chunk(FinishReason::Stop))
            })))
        }
        async fn generate_with_tools(&self, request: GenerateRequest, _tools: &[ToolDefinition]) -> CoreResult<GenerateResponse> {
            self.generate(request).await
        }
        async fn is_available(&self) -> bool {
            true
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    /// Always hands back the same fixed document pool no matter the
    /// domain, embedding, or `k` requested.
    struct MockVectorStore {
        documents: Vec<Document>,
    }

    #[async_trait]
    impl VectorStoreFacade for MockVectorStore {
        async fn similarity_search(
            &self,
            _domain: Domain,
            _query_embedding: &[f32],
            _k: usize,
            _filter: Option<MetadataMatch>,
        ) -> sme_rag_core::Result<Vec<Document>> {
            Ok(self.documents.clone())
        }
        async fn mmr_search(
            &self,
            _domain: Domain,
            _query_embedding: &[f32],
            _k: usize,
            _fetch_k: usize,
            _lambda: f32,
        ) -> sme_rag_core::Result<Vec<Document>> {
            Ok(self.documents.clone())
        }
        fn get_collection(&self, domain: Domain) -> String {
            format!("test_{}", domain.as_str())
        }
    }

    struct ConstEmbedder;

    #[async_trait]
    impl EmbeddingClient for ConstEmbedder {
        async fn embed(&self, _text: &str) -> sme_rag_core::Result<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }
        fn dim(&self) -> usize {
            3
        }
    }

    /// Scores every candidate high enough to clear the `avg_similarity >=
    /// 0.4` Ok threshold, since real RRF scores alone never do (§4.8).
    struct HighScoreReranker;

    #[async_trait]
    impl RerankClient for HighScoreReranker {
        async fn score(&self, _query: &str, documents: &[String]) -> sme_rag_core::Result<Vec<f32>> {
            Ok(vec![0.9; documents.len()])
        }
    }

    /// Builds an isolated `PipelineContext` with fakes standing in for
    /// every external backend, so the router's node wiring is testable
    /// without a live Qdrant/Ollama/reranker endpoint.
    fn test_context(
        classifier_llm: Arc<dyn LanguageModel>,
        llm_only: bool,
        decomposer_llm: Arc<dyn LanguageModel>,
        rewriter_llm: Arc<dyn LanguageModel>,
        generator_llm: Arc<dyn LanguageModel>,
        evaluator_llm: Arc<dyn LanguageModel>,
        retrieval_llm: Arc<dyn LanguageModel>,
        documents: Vec<Document>,
        configure: impl FnOnce(&mut Settings),
    ) -> Arc<PipelineContext> {
        let mut settings = Settings::default();
        settings.features.legal_supplement = false;
        settings.features.cross_domain_rerank = false;
        configure(&mut settings);

        let embedder: Arc<dyn EmbeddingClient> = Arc::new(ConstEmbedder);
        let reranker: Arc<dyn RerankClient> = Arc::new(HighScoreReranker);
        let vector_store: Arc<dyn VectorStoreFacade> = Arc::new(MockVectorStore { documents });
        let bm25 = Arc::new(Bm25IndexTable::new(Bm25Config::default()));

        let hybrid_config = HybridSearchConfig { min_domain_k: 1, ..HybridSearchConfig::default() };
        let searcher = Arc::new(
            HybridSearcher::new(Arc::clone(&vector_store), Arc::clone(&bm25), Arc::clone(&embedder), hybrid_config)
                .with_reranker(Arc::clone(&reranker)),
        );

        let classifier = Arc::new(if llm_only {
            DomainClassifier::new(
                classifier_llm,
                Arc::clone(&embedder),
                ClassifierConfig { mode: sme_rag_config::settings::ClassifierMode::LlmOnly, ..ClassifierConfig::default() },
            )
        } else {
            DomainClassifier::keyword_only(classifier_llm, ClassifierConfig::default())
        });

        let decomposer = Arc::new(QuestionDecomposer::new(decomposer_llm, DecomposerConfig::default()));
        let rewriter = Arc::new(QueryRewriter::new(rewriter_llm, RewriterConfig::default()));

        let retrieval_agent = Arc::new(RetrievalAgent::new(
            Arc::clone(&searcher),
            retrieval_llm,
            RetrievalAgentConfig { enable_legal_supplement: false, enable_cross_domain_rerank: false, ..RetrievalAgentConfig::default() },
        ));

        let generator = Arc::new(ResponseGenerator::new(generator_llm, PromptTemplates::default(), GeneratorConfig::default()));
        let evaluator = Arc::new(Evaluator::new(evaluator_llm, EvaluatorConfig::default()));

        Arc::new(PipelineContext {
            settings,
            llm: classifier.clone() as Arc<dyn LanguageModel>,
            embedder,
            reranker,
            vector_store,
            bm25,
            searcher,
            classifier,
            decomposer,
            rewriter,
            retrieval_agent,
            generator,
            evaluator,
            response_cache: Arc::new(crate::cache::ResponseCache::new()),
        })
    }

    fn canned_docs() -> Vec<Document> {
        vec![
            Document::new(CANNED_CONTENT).with_meta("source", "a.md").with_meta("title", "안내"),
            Document::new(CANNED_CONTENT).with_meta("source", "b.md").with_meta("title", "안내2"),
        ]
    }

    const PASS_EVAL: &str =
        r#"{"scores": {"relevance": 9, "faithfulness": 9, "completeness": 8, "clarity": 8, "citation_discipline": 8}, "feedback": "ok"}"#;
    const FAIL_EVAL: &str =
        r#"{"scores": {"relevance": 9, "faithfulness": 2, "completeness": 8, "clarity": 8, "citation_discipline": 8}}"#;

    #[tokio::test]
    async fn test_off_domain_query_is_rejected_without_retrieval() {
        let ctx = test_context(
            StubLlm::fixed(r#"{"domains": [], "is_rejection": true}"#),
            true,
            StubLlm::fixed(""),
            StubLlm::fixed(""),
            StubLlm::fixed("never called"),
            StubLlm::fixed(PASS_EVAL),
            StubLlm::fixed(""),
            canned_docs(),
            |_| {},
        );
        let router = Router::new(ctx);
        let state = router.process("오늘 날씨 어때요", vec![], None).await;
        assert_eq!(state.generation.unwrap().content, sme_rag_core::REJECTION_MESSAGE);
        assert!(state.sub_queries.is_empty());
        assert!(state.retrieval_results.is_empty());
    }

    #[tokio::test]
    async fn test_single_domain_factual_query_generates_and_passes() {
        let ctx = test_context(
            StubLlm::fixed(""),
            false,
            StubLlm::fixed(""),
            StubLlm::fixed(""),
            StubLlm::fixed("부가세는 매 분기 신고합니다 [1]"),
            StubLlm::fixed(PASS_EVAL),
            StubLlm::fixed(""),
            canned_docs(),
            |_| {},
        );
        let router = Router::new(ctx);
        let state = router.process("부가세 신고 기한 안내", vec![], None).await;
        assert_eq!(state.classification.unwrap().domains, vec![Domain::FinanceTax]);
        assert_eq!(state.sub_queries.len(), 1);
        assert_eq!(state.generation.unwrap().content, "부가세는 매 분기 신고합니다 [1]");
        assert!(state.evaluation.unwrap().passed);
        assert_eq!(state.retry_count, 0);
    }

    #[tokio::test]
    async fn test_multi_domain_composite_query_decomposes_per_domain() {
        let decompose_json = r#"{"sub_queries": [
            {"domain": "finance_tax", "text": "부가세 신고 기한"},
            {"domain": "hr_labor", "text": "근로계약서 퇴직금 계산"}
        ]}"#;
        let ctx = test_context(
            StubLlm::fixed(""),
            false,
            StubLlm::fixed(decompose_json),
            StubLlm::fixed(""),
            StubLlm::fixed("통합 답변입니다"),
            StubLlm::fixed(PASS_EVAL),
            StubLlm::fixed(""),
            canned_docs(),
            |_| {},
        );
        let router = Router::new(ctx);
        let state = router.process("부가세 신고와 근로계약서 퇴직금 문의", vec![], None).await;
        let classification = state.classification.unwrap();
        assert_eq!(classification.domains, vec![Domain::FinanceTax, Domain::HrLabor]);
        assert_eq!(state.sub_queries.len(), 2);
        assert_eq!(state.retrieval_results.len(), 2);
        assert_eq!(state.generation.unwrap().content, "통합 답변입니다");
    }

    #[tokio::test]
    async fn test_anaphoric_followup_is_rewritten_before_classification() {
        let history = vec![
            Turn::user("부가세 신고 기한 안내"),
            Turn::assistant("부가세는 매 분기 신고합니다"),
        ];
        let ctx = test_context(
            StubLlm::fixed(""),
            false,
            StubLlm::fixed(""),
            StubLlm::fixed("\"부가세 신고 기한 안내\""),
            StubLlm::fixed("기한 내 신고하시면 됩니다"),
            StubLlm::fixed(PASS_EVAL),
            StubLlm::fixed(""),
            canned_docs(),
            |_| {},
        );
        let router = Router::new(ctx);
        let state = router.process("그럼 언제까지 내야 하나요", history, None).await;
        assert!(state.query_rewrite.as_ref().unwrap().applied);
        assert_eq!(state.classification.unwrap().domains, vec![Domain::FinanceTax]);
    }

    #[tokio::test]
    async fn test_failed_evaluation_retries_and_advances_the_ladder() {
        let ctx = test_context(
            StubLlm::fixed(""),
            false,
            StubLlm::fixed(""),
            StubLlm::fixed(""),
            StubLlm::fixed("부가세는 매 분기 신고합니다 [1]"),
            StubLlm::then(FAIL_EVAL, PASS_EVAL),
            StubLlm::fixed(""),
            canned_docs(),
            |_| {},
        );
        let router = Router::new(ctx);
        let state = router.process("부가세 신고 기한 안내", vec![], None).await;
        assert_eq!(state.retry_count, 1);
        assert!(state.evaluation.unwrap().passed);
        // The floor carried into the second pass is the level the first
        // pass landed on, advanced by one — never back to L0 (§9).
        assert!(state.retrieval_results[0].retry_level.as_u8() >= RetryLevel::L1RelaxParams.as_u8());
    }

    #[tokio::test]
    async fn test_stream_emits_sources_then_tokens_then_actions_then_done() {
        let ctx = test_context(
            StubLlm::fixed(""),
            false,
            StubLlm::fixed(""),
            StubLlm::fixed(""),
            StubLlm::fixed("근로계약서 작성 시 필수 항목을 안내드립니다"),
            StubLlm::fixed(PASS_EVAL),
            StubLlm::fixed(""),
            canned_docs(),
            |_| {},
        );
        let router = Router::new(ctx);
        let events: Vec<StreamEvent> = router.stream("근로계약서 작성 방법", vec![], None).collect().await;
        let first_source = events.iter().position(|e| matches!(e, StreamEvent::Source(_)));
        let first_token = events.iter().position(|e| matches!(e, StreamEvent::Token { .. }));
        let first_action = events.iter().position(|e| matches!(e, StreamEvent::Action(_)));
        let done = events.iter().position(|e| matches!(e, StreamEvent::Done(_)));
        assert!(first_source.unwrap() < first_token.unwrap());
        assert!(first_token.unwrap() < first_action.unwrap());
        assert!(first_action.unwrap() < done.unwrap());
        assert_eq!(events.iter().filter(|e| matches!(e, StreamEvent::Done(_))).count(), 1);
    }
}
