//! Pipeline context: the process-owned lifecycle object (§9 "Global mutable
//! state" design note)
//!
//! The classifier's vector-centroid cache and the BM25 indexes are
//! process-wide. Rather than scatter that global state across free
//! functions, it is owned by one `PipelineContext`, built once by
//! `PipelineContext::startup` and torn down by `shutdown`. The router
//! receives this context by reference (`Arc<PipelineContext>`), so tests
//! construct an isolated context per test instead of sharing process
//! globals.

use std::sync::Arc;

use sme_rag_agent::{
    ClassifierConfig, DecomposerConfig, DomainClassifier, EvaluatorConfig, Evaluator,
    GeneratorConfig, QuestionDecomposer, QueryRewriter, ResponseGenerator, RewriterConfig,
};
use sme_rag_config::{PromptTemplates, Settings};
use sme_rag_core::{LanguageModel, Result};
use sme_rag_llm::{
    CachedEmbeddingClient, ChatLlmClient, ChatLlmConfig, EmbeddingClient, EmbeddingConfig,
    HttpRerankClient, OllamaEmbeddingClient, RerankClient, RerankConfig,
};
use sme_rag_rag::{
    Bm25Config, Bm25IndexTable, HybridSearchConfig, HybridSearcher, QdrantVectorStore,
    RetrievalAgent, RetrievalAgentConfig, VectorStoreConfig, VectorStoreFacade,
};

use crate::cache::ResponseCache;

/// Everything a request needs to run the pipeline, wired once at process
/// start and shared (read-only, internally synchronized) across requests.
pub struct PipelineContext {
    pub settings: Settings,
    pub llm: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub reranker: Arc<dyn RerankClient>,
    pub vector_store: Arc<dyn VectorStoreFacade>,
    pub bm25: Arc<Bm25IndexTable>,
    pub searcher: Arc<HybridSearcher>,
    pub classifier: Arc<DomainClassifier>,
    pub decomposer: Arc<QuestionDecomposer>,
    pub rewriter: Arc<QueryRewriter>,
    pub retrieval_agent: Arc<RetrievalAgent>,
    pub generator: Arc<ResponseGenerator>,
    pub evaluator: Arc<Evaluator>,
    pub response_cache: Arc<ResponseCache>,
}

impl PipelineContext {
    /// Build every backend client and stage, once, at process start.
    pub fn startup(settings: Settings) -> Result<Self> {
        let llm: Arc<dyn LanguageModel> = Arc::new(ChatLlmClient::new(ChatLlmConfig {
            model: settings.backend.llm_model_id.clone(),
            ..ChatLlmConfig::default()
        })?);

        let embedder: Arc<dyn EmbeddingClient> = Arc::new(CachedEmbeddingClient::new(
            OllamaEmbeddingClient::new(EmbeddingConfig {
                model: settings.backend.embedding_model_id.clone(),
                ..EmbeddingConfig::default()
            }),
            2048,
        ));

        let reranker: Arc<dyn RerankClient> = Arc::new(HttpRerankClient::new(RerankConfig {
            model: settings.backend.reranker_model_id.clone(),
            ..RerankConfig::default()
        }));

        let vector_store: Arc<dyn VectorStoreFacade> = Arc::new(QdrantVectorStore::new(VectorStoreConfig {
            endpoint: settings.backend.vector_store_url.clone(),
            ..VectorStoreConfig::default()
        })?);

        let bm25 = Arc::new(Bm25IndexTable::new(Bm25Config::default()));

        let hybrid_config = HybridSearchConfig { enable_reranking: settings.features.reranking, ..HybridSearchConfig::default() };
        let mut searcher = HybridSearcher::new(Arc::clone(&vector_store), Arc::clone(&bm25), Arc::clone(&embedder), hybrid_config);
        if settings.features.reranking {
            searcher = searcher.with_reranker(Arc::clone(&reranker));
        }
        let searcher = Arc::new(searcher);

        let classifier_config = ClassifierConfig {
            mode: settings.classifier_mode,
            rejection_vector_threshold: settings.retrieval.rejection_vector_threshold,
            multi_domain_gap: settings.retrieval.multi_domain_gap,
            ..ClassifierConfig::default()
        };
        let classifier = Arc::new(DomainClassifier::new(Arc::clone(&llm), Arc::clone(&embedder), classifier_config));

        let decomposer = Arc::new(QuestionDecomposer::new(Arc::clone(&llm), DecomposerConfig::default()));
        let rewriter = Arc::new(QueryRewriter::new(Arc::clone(&llm), RewriterConfig::default()));

        let retrieval_config = RetrievalAgentConfig {
            max_retry_level: settings.retrieval.max_retry_level,
            max_legal_supplement: settings.retrieval.max_legal_supplement,
            enable_legal_supplement: settings.features.legal_supplement,
            enable_cross_domain_rerank: settings.features.cross_domain_rerank,
            document_budget: sme_rag_rag::DocumentBudget {
                base_k: settings.retrieval.retrieval_k,
                min_domain_k: settings.retrieval.min_domain_k,
                max_per_domain: settings.retrieval.retrieval_k.max(settings.retrieval.min_domain_k) * 2,
                max_retrieval_docs: settings.retrieval.max_retrieval_docs,
            },
        };
        let mut retrieval_agent = RetrievalAgent::new(Arc::clone(&searcher), Arc::clone(&llm), retrieval_config);
        if settings.features.cross_domain_rerank {
            retrieval_agent = retrieval_agent.with_reranker(Arc::clone(&reranker));
        }
        let retrieval_agent = Arc::new(retrieval_agent);

        let generator_config = GeneratorConfig {
            max_tokens: settings.pipeline.generation_max_tokens,
            business_plan_max_tokens: settings.pipeline.business_plan_max_tokens,
            action_aware_generation: settings.features.action_aware_generation,
            ..GeneratorConfig::default()
        };
        let generator = Arc::new(ResponseGenerator::new(Arc::clone(&llm), PromptTemplates::default(), generator_config));

        let evaluator = Arc::new(Evaluator::new(Arc::clone(&llm), EvaluatorConfig::default()));

        let response_cache = Arc::new(ResponseCache::new());

        Ok(Self {
            settings,
            llm,
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
            response_cache,
        })
    }

    /// Flush caches on process teardown (§5: "teardown flushes caches").
    /// Backend connections are pool-owned and drop with their `Arc`s when
    /// the context itself is dropped.
    pub fn shutdown(&self) {
        self.response_cache.clear();
        tracing::info!("pipeline context shutdown: flushed response cache");
    }
}
