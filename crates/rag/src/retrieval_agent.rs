//! Retrieval Agent (component L9)
//!
//! Generalizes the teacher's `adapter::EnhancedRetriever` (expansion +
//! boosting + agentic multi-step retrieval) into the spec's graduated
//! retry state machine: adaptive strategy selection, a document budget
//! calculator, the L0-L4 retry ladder, rule-based retrieval evaluation,
//! the legal-supplement fetch, and cross-domain rerank.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sme_rag_core::{
    Document, Domain, LanguageModel, RetrievalResult, RetrievalStatus, RetryLevel, SearchStrategy,
    SubQuery,
};
use sme_rag_llm::RerankClient;

use crate::hybrid::HybridSearcher;

/// Content-word stopword set small enough to keep false negatives rare;
/// particles and copulas are stripped before keyword-match scoring.
const KOREAN_STOPWORDS: &[&str] = &[
    "은", "는", "이", "가", "을", "를", "의", "에", "에서", "으로", "로", "와", "과", "도",
    "만", "까지", "부터", "이다", "입니다", "습니다", "있다", "하다",
];

/// Per-domain, per-request document budget (§4.8 `DocumentBudgetCalculator`).
#[derive(Debug, Clone, Copy)]
pub struct DocumentBudget {
    pub base_k: usize,
    pub min_domain_k: usize,
    pub max_per_domain: usize,
    pub max_retrieval_docs: usize,
}

impl Default for DocumentBudget {
    fn default() -> Self {
        Self { base_k: 6, min_domain_k: 2, max_per_domain: 10, max_retrieval_docs: 12 }
    }
}

impl DocumentBudget {
    /// `k = clamp(base_k + (is_citation ? 2 : 0), min_domain_k, max_per_domain)`.
    pub fn per_domain_k(&self, is_citation: bool) -> usize {
        let bumped = self.base_k + if is_citation { 2 } else { 0 };
        bumped.clamp(self.min_domain_k, self.max_per_domain)
    }

    /// Scale each domain's requested `k` down proportionally so the sum
    /// never exceeds `max_retrieval_docs`, never dropping below
    /// `min_domain_k` while any slack remains.
    pub fn allocate(&self, requested: &[usize]) -> Vec<usize> {
        let total: usize = requested.iter().sum();
        if total <= self.max_retrieval_docs || requested.is_empty() {
            return requested.to_vec();
        }
        let mut allocated: Vec<usize> = requested.iter().map(|&k| k.min(self.min_domain_k)).collect();
        let mut remaining = self.max_retrieval_docs.saturating_sub(allocated.iter().sum::<usize>());
        let mut idx = 0;
        while remaining > 0 {
            let slot = idx % requested.len();
            if allocated[slot] < requested[slot] {
                allocated[slot] += 1;
                remaining -= 1;
            }
            idx += 1;
            if idx > requested.len() * self.max_retrieval_docs.max(1) {
                break;
            }
        }
        allocated
    }
}

/// Strategy selector: picks one of the five `SearchStrategy` variants from
/// surface characteristics of the query (§4.8).
pub fn select_strategy(query: &str) -> SearchStrategy {
    let word_count = query.split_whitespace().count();
    let has_citation = contains_legal_citation(query);
    let has_numeric = query.chars().any(|c| c.is_ascii_digit());

    if has_citation {
        SearchStrategy::LexicalOnly
    } else if has_numeric && word_count <= 6 {
        SearchStrategy::Bm25Heavy
    } else if word_count > 20 {
        SearchStrategy::VectorHeavy
    } else if word_count <= 3 {
        SearchStrategy::SemanticOnly
    } else {
        SearchStrategy::Hybrid
    }
}

/// Detects Korean legal-citation markers like "제3조" or "제2항".
pub fn contains_legal_citation(query: &str) -> bool {
    let chars: Vec<char> = query.chars().collect();
    for (idx, c) in chars.iter().enumerate() {
        if *c == '제' && idx + 2 < chars.len() {
            let rest: String = chars[idx + 1..].iter().take(6).collect();
            if rest.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
                && (rest.contains('조') || rest.contains('항'))
            {
                return true;
            }
        }
    }
    false
}

fn content_words(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || "?!.,()[]\"'".contains(c))
        .map(|w| w.trim())
        .filter(|w| !w.is_empty() && !KOREAN_STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Fraction of the query's content words present in the retrieved pool's
/// combined text (§4.8 rule-based evaluation).
fn keyword_match_ratio(query: &str, documents: &[Document]) -> f32 {
    let query_words = content_words(query);
    if query_words.is_empty() {
        return 1.0;
    }
    let pool_text: String = documents.iter().map(|d| d.content.as_str()).collect::<Vec<_>>().join(" ");
    let matched = query_words.iter().filter(|w| pool_text.contains(w.as_str())).count();
    matched as f32 / query_words.len() as f32
}

/// Average of each document's fused/rerank score, read from the metadata
/// the hybrid searcher attaches; documents without a recorded score count
/// as 0 similarity so a thin pool still lowers the average honestly.
fn avg_similarity(documents: &[Document]) -> f32 {
    if documents.is_empty() {
        return 0.0;
    }
    let sum: f32 = documents
        .iter()
        .map(|d| {
            d.metadata
                .get("rerank_score")
                .or_else(|| d.metadata.get("fused_score"))
                .and_then(|v| match v {
                    sme_rag_core::MetaValue::Float(f) => Some(*f as f32),
                    _ => None,
                })
                .unwrap_or(0.0)
        })
        .sum();
    sum / documents.len() as f32
}

#[derive(Debug, Clone)]
pub struct RetrievalAgentConfig {
    pub document_budget: DocumentBudget,
    pub max_retry_level: u8,
    pub max_legal_supplement: usize,
    pub enable_legal_supplement: bool,
    pub enable_cross_domain_rerank: bool,
}

impl Default for RetrievalAgentConfig {
    fn default() -> Self {
        Self {
            document_budget: DocumentBudget::default(),
            max_retry_level: 4,
            max_legal_supplement: 3,
            enable_legal_supplement: true,
            enable_cross_domain_rerank: true,
        }
    }
}

impl RetrievalAgentConfig {
    /// `k` only bumps once, on entering `L1RelaxParams` or beyond; later
    /// levels reuse that bumped budget rather than bumping further.
    fn k_for_level(&self, base_k: usize, level: RetryLevel) -> usize {
        if level.as_u8() >= RetryLevel::L1RelaxParams.as_u8() {
            base_k + self.document_budget.base_k.max(2)
        } else {
            base_k
        }
    }
}

pub struct RetrievalAgent {
    searcher: Arc<HybridSearcher>,
    llm: Arc<dyn LanguageModel>,
    reranker: Option<Arc<dyn RerankClient>>,
    config: RetrievalAgentConfig,
}

impl RetrievalAgent {
    pub fn new(searcher: Arc<HybridSearcher>, llm: Arc<dyn LanguageModel>, config: RetrievalAgentConfig) -> Self {
        Self { searcher, llm, reranker: None, config }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn RerankClient>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Retrieve documents for a single sub-query, climbing the graduated
    /// retry ladder until the rule-based evaluation passes, the level cap
    /// is reached, or the remaining budget runs out.
    ///
    /// `floor` is the level this call starts its climb from. A fresh
    /// request passes `RetryLevel::L0Initial`; the router's post-eval
    /// retry loop passes the level the previous pass landed on (advanced
    /// by one), so the ladder keeps climbing across outer retries instead
    /// of resetting to L0 every time (§9 "explicit retry_level counter").
    pub async fn retrieve(&self, sub_query: &SubQuery, original_query: &str, budget: Duration, floor: RetryLevel) -> RetrievalResult {
        let deadline = Instant::now() + budget;
        let strategy = select_strategy(&sub_query.text);
        let is_citation = contains_legal_citation(&sub_query.text);
        let base_k = self.config.document_budget.per_domain_k(is_citation);

        let mut level = floor;
        let mut used_multi_query = level.as_u8() >= RetryLevel::L2MultiQuery.as_u8();
        let mut documents = self.search_for_level(sub_query, level, self.config.k_for_level(base_k, level), strategy).await;

        loop {
            let match_ratio = keyword_match_ratio(&sub_query.text, &documents);
            let sim = avg_similarity(&documents);
            let status = RetrievalResult::classify_status(match_ratio, sim, documents.len());

            if status == RetrievalStatus::Ok || level.as_u8() >= self.config.max_retry_level || Instant::now() >= deadline {
                let mut result = RetrievalResult {
                    domain: sub_query.domain,
                    sub_query: sub_query.text.clone(),
                    documents,
                    strategy_used: strategy,
                    retry_level: level,
                    used_multi_query,
                    doc_count: 0,
                    keyword_match_ratio: match_ratio,
                    avg_similarity: sim,
                    status,
                };
                result.doc_count = result.documents.len();
                if status != RetrievalStatus::Ok && level.as_u8() >= self.config.max_retry_level {
                    result.status = RetrievalStatus::Partial.min_with(status);
                }
                self.apply_legal_supplement(&mut result, original_query).await;
                return result;
            }

            let next = level.next().expect("retry ladder bounded by max_retry_level check above");
            if next == RetryLevel::L2MultiQuery {
                used_multi_query = true;
            }
            documents = self.search_for_level(sub_query, next, self.config.k_for_level(base_k, next), strategy).await;
            level = next;
        }
    }

    /// Perform the ladder action for `level` fresh, independent of any
    /// documents a previous call in the same request may have seen — a
    /// resumed call has no prior-call documents to carry over.
    async fn search_for_level(&self, sub_query: &SubQuery, level: RetryLevel, k: usize, strategy: SearchStrategy) -> Vec<Document> {
        match level {
            RetryLevel::L0Initial => self.search_once(&sub_query.text, sub_query.domain, k, strategy, true).await,
            RetryLevel::L1RelaxParams => self.search_once(&sub_query.text, sub_query.domain, k, strategy, false).await,
            RetryLevel::L2MultiQuery => self.multi_query_search(&sub_query.text, sub_query.domain, k, strategy).await,
            RetryLevel::L3CrossDomain => {
                let mut pool = self.search_once(&sub_query.text, sub_query.domain, k, strategy, true).await;
                pool.extend(self.search_once(&sub_query.text, Domain::LawCommon, k, strategy, true).await);
                pool
            }
            RetryLevel::L4Partial => self.search_once(&sub_query.text, sub_query.domain, k, strategy, true).await,
        }
    }

    async fn search_once(&self, query: &str, domain: Domain, k: usize, strategy: SearchStrategy, rerank: bool) -> Vec<Document> {
        self.searcher.search(query, domain, k, strategy, rerank).await.unwrap_or_default()
    }

    /// L2 MULTI_QUERY: ask the LLM for query variants, search each, union
    /// the pools (duplicates collapse naturally via `dedup_key` downstream).
    async fn multi_query_search(&self, query: &str, domain: Domain, k: usize, strategy: SearchStrategy) -> Vec<Document> {
        let variants = self.expand_query_variants(query).await;
        let mut pool = Vec::new();
        for variant in variants {
            pool.extend(self.search_once(&variant, domain, k, strategy, false).await);
        }
        sme_rag_core::dedup_documents(pool)
    }

    async fn expand_query_variants(&self, query: &str) -> Vec<String> {
        let request = sme_rag_core::GenerateRequest::new(
            "사용자 질문을 의미가 같은 3개의 다른 표현으로 바꿔 쓰세요. 한 줄에 하나씩, 설명 없이 출력하세요.",
        )
        .with_user_message(query)
        .with_temperature(0.5)
        .with_max_tokens(200);

        match self.llm.generate(request).await {
            Ok(response) => {
                let mut variants: Vec<String> =
                    response.text.lines().map(|l| l.trim().trim_start_matches(['-', '*', '·']).trim().to_string()).filter(|l| !l.is_empty()).collect();
                variants.push(query.to_string());
                variants
            }
            Err(_) => vec![query.to_string()],
        }
    }

    /// Legal supplement: when the domain isn't already `law_common` and the
    /// query carries a legal-trigger token, fetch up to `max_legal_supplement`
    /// docs from `law_common` and union, bounded by `max_retrieval_docs`.
    async fn apply_legal_supplement(&self, result: &mut RetrievalResult, original_query: &str) {
        if !self.config.enable_legal_supplement || result.domain == Domain::LawCommon {
            return;
        }
        let has_trigger = sme_rag_config::LEGAL_TRIGGER_TOKENS.iter().any(|t| original_query.contains(t));
        if !has_trigger {
            return;
        }
        let supplement = self
            .search_once(
                original_query,
                Domain::LawCommon,
                self.config.max_legal_supplement,
                SearchStrategy::LexicalOnly,
                false,
            )
            .await;
        result.documents.extend(supplement);
        result.documents = sme_rag_core::dedup_documents(std::mem::take(&mut result.documents));
        result.documents.truncate(self.config.document_budget.max_retrieval_docs);
        result.doc_count = result.documents.len();
    }

    /// Cross-domain rerank: when more than one domain produced results and
    /// `enable_cross_domain_rerank` is set, rerank the concatenated pool
    /// against the original user query and reallocate `final_k_per_domain`
    /// preserving `min_domain_k` per domain (§4.8).
    pub async fn cross_domain_rerank(&self, mut results: Vec<RetrievalResult>, original_query: &str) -> Vec<RetrievalResult> {
        if !self.config.enable_cross_domain_rerank || results.len() <= 1 {
            return results;
        }
        let Some(reranker) = &self.reranker else { return results };

        let mut pool: Vec<(usize, Document)> = Vec::new();
        for (idx, result) in results.iter().enumerate() {
            for doc in &result.documents {
                pool.push((idx, doc.clone()));
            }
        }
        if pool.is_empty() {
            return results;
        }

        let texts: Vec<String> = pool.iter().map(|(_, d)| d.content.clone()).collect();
        let scores = match reranker.score(original_query, &texts).await {
            Ok(scores) => scores,
            Err(_) => return results,
        };

        let mut scored: Vec<(usize, Document, f32)> =
            pool.into_iter().zip(scores).map(|((idx, doc), score)| (idx, doc, score)).collect();
        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let min_k = self.config.document_budget.min_domain_k;
        let mut per_domain: std::collections::HashMap<usize, Vec<Document>> = std::collections::HashMap::new();
        for (idx, doc, _) in scored {
            let slot = per_domain.entry(idx).or_default();
            let already_has_min = per_domain.values().filter(|v| v.len() >= min_k).count();
            let final_k = self.config.document_budget.max_per_domain;
            if slot.len() < final_k.max(min_k) || already_has_min < results.len() {
                slot.push(doc);
            }
        }

        for (idx, result) in results.iter_mut().enumerate() {
            if let Some(reranked) = per_domain.remove(&idx) {
                result.documents = reranked;
                result.doc_count = result.documents.len();
            }
        }
        results
    }
}

trait RetrievalStatusExt {
    fn min_with(self, other: RetrievalStatus) -> RetrievalStatus;
}

impl RetrievalStatusExt for RetrievalStatus {
    fn min_with(self, other: RetrievalStatus) -> RetrievalStatus {
        fn rank(s: RetrievalStatus) -> u8 {
            match s {
                RetrievalStatus::Empty => 0,
                RetrievalStatus::Partial => 1,
                RetrievalStatus::Ok => 2,
            }
        }
        if rank(self) <= rank(other) {
            self
        } else {
            other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection_legal_citation_is_lexical() {
        assert_eq!(select_strategy("근로기준법 제23조 해고 제한 사항이 궁금합니다"), SearchStrategy::LexicalOnly);
    }

    #[test]
    fn test_strategy_selection_short_query_is_semantic() {
        assert_eq!(select_strategy("부가세 신고"), SearchStrategy::SemanticOnly);
    }

    #[test]
    fn test_budget_per_domain_k_citation_bump() {
        let budget = DocumentBudget::default();
        assert_eq!(budget.per_domain_k(false), 6);
        assert_eq!(budget.per_domain_k(true), 8);
    }

    #[test]
    fn test_budget_allocate_caps_total() {
        let budget = DocumentBudget { base_k: 6, min_domain_k: 2, max_per_domain: 10, max_retrieval_docs: 12 };
        let allocated = budget.allocate(&[6, 6, 6]);
        assert!(allocated.iter().sum::<usize>() <= 12);
        assert!(allocated.iter().all(|&k| k >= 2));
    }

    #[test]
    fn test_keyword_match_ratio_full_overlap() {
        let docs = vec![Document::new("부가세 신고 기한은 다음과 같습니다")];
        let ratio = keyword_match_ratio("부가세 신고 기한", &docs);
        assert!(ratio > 0.9);
    }

    #[test]
    fn test_contains_legal_citation() {
        assert!(contains_legal_citation("근로기준법 제23조에 따르면"));
        assert!(!contains_legal_citation("부가세 신고는 언제 하나요"));
    }

    #[test]
    fn test_k_for_level_bumps_once_at_l1_and_stays() {
        let config = RetrievalAgentConfig::default();
        let base_k = config.document_budget.base_k;
        assert_eq!(config.k_for_level(base_k, RetryLevel::L0Initial), base_k);
        let bumped = config.k_for_level(base_k, RetryLevel::L1RelaxParams);
        assert!(bumped > base_k);
        assert_eq!(config.k_for_level(base_k, RetryLevel::L2MultiQuery), bumped);
        assert_eq!(config.k_for_level(base_k, RetryLevel::L4Partial), bumped);
    }

    #[tokio::test]
    async fn test_retrieve_resumes_from_floor_instead_of_restarting() {
        let searcher = Arc::new(HybridSearcher::new(
            Arc::new(EmptyVectorStore),
            Arc::new(crate::bm25::Bm25IndexTable::new(crate::bm25::Bm25Config::default())),
            Arc::new(ZeroEmbedder),
            crate::hybrid::HybridSearchConfig { enable_reranking: false, ..Default::default() },
        ));
        let agent = RetrievalAgent::new(searcher, Arc::new(EchoLlm), RetrievalAgentConfig::default());
        let sub_query = SubQuery::identity("부가세 신고 기한", Domain::FinanceTax);

        let result = agent.retrieve(&sub_query, "부가세 신고 기한", Duration::from_secs(5), RetryLevel::L3CrossDomain).await;

        assert!(result.retry_level.as_u8() >= RetryLevel::L3CrossDomain.as_u8());
    }

    struct EmptyVectorStore;
    #[async_trait::async_trait]
    impl crate::vector_store::VectorStoreFacade for EmptyVectorStore {
        async fn similarity_search(
            &self,
            _domain: Domain,
            _query_embedding: &[f32],
            _k: usize,
            _filter: Option<crate::vector_store::MetadataMatch>,
        ) -> sme_rag_core::Result<Vec<Document>> {
            Ok(Vec::new())
        }
        async fn mmr_search(
            &self,
            _domain: Domain,
            _query_embedding: &[f32],
            _k: usize,
            _fetch_k: usize,
            _lambda: f32,
        ) -> sme_rag_core::Result<Vec<Document>> {
            Ok(Vec::new())
        }
        fn get_collection(&self, domain: Domain) -> String {
            domain.as_str().to_string()
        }
    }

    struct ZeroEmbedder;
    #[async_trait::async_trait]
    impl sme_rag_llm::EmbeddingClient for ZeroEmbedder {
        async fn embed(&self, _text: &str) -> sme_rag_core::Result<Vec<f32>> {
            Ok(vec![0.0; 4])
        }
        fn dim(&self) -> usize {
            4
        }
    }

    struct EchoLlm;
    #[async_trait::async_trait]
    impl LanguageModel for EchoLlm {
        async fn generate(&self, _request: sme_rag_core::GenerateRequest) -> sme_rag_core::Result<sme_rag_core::GenerateResponse> {
            Ok(sme_rag_core::GenerateResponse::text("부가세 신고 기한"))
        }
        fn generate_stream<'a>(
            &'a self,
            _request: sme_rag_core::GenerateRequest,
        ) -> std::pin::Pin<Box<dyn futures::Stream<Item = sme_rag_core::Result<sme_rag_core::StreamChunk>> + Send + 'a>> {
            Box::pin(futures::stream::empty())
        }
        async fn generate_with_tools(
            &self,
            request: sme_rag_core::GenerateRequest,
            _tools: &[sme_rag_core::ToolDefinition],
        ) -> sme_rag_core::Result<sme_rag_core::GenerateResponse> {
            self.generate(request).await
        }
        async fn is_available(&self) -> bool {
            true
        }
        fn model_name(&self) -> &str {
            "echo"
        }
    }
}
