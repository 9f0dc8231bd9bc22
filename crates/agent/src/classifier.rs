//! Domain classifier (component L6, §4.5)
//!
//! Routes a sanitized query to one, two, or three expert domains, or to
//! the terminal rejection verdict when no domain carries evidence. Two
//! modes: `Hybrid` blends keyword/compound-rule hits with cosine
//! similarity against a per-domain centroid embedding; `LlmOnly` asks the
//! chat model directly for a verdict and falls back to `Hybrid` on
//! timeout or unparseable output. Failure modes per §4.5: vector-store
//! failure degrades to keyword-only scoring; an empty result (no domain
//! carries any evidence, see `select_domains`) routes to `general`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::warn;

use sme_rag_config::domain_profile::{domain_profiles, DomainProfile, DomainProfileTable};
use sme_rag_config::settings::ClassifierMode;
use sme_rag_core::{
    ClassificationResult, ClassificationSource, Domain, GenerateRequest, LanguageModel,
    EXPERT_DOMAINS,
};
use sme_rag_llm::EmbeddingClient;

/// Tunables for [`DomainClassifier`].
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub mode: ClassifierMode,
    /// Below this cosine similarity (to every domain centroid), and absent
    /// any keyword hit, a query is rejected (§4.5).
    pub rejection_vector_threshold: f32,
    /// Domains within this gap of the top score are co-selected.
    pub multi_domain_gap: f32,
    /// Additive confidence bonus for a domain with a keyword/compound hit.
    pub keyword_confidence_boost: f32,
    /// Bound on the LLM-only classification call before falling back to hybrid.
    pub llm_timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: ClassifierMode::Hybrid,
            rejection_vector_threshold: 0.35,
            multi_domain_gap: 0.1,
            keyword_confidence_boost: 0.1,
            llm_timeout: Duration::from_secs(5),
        }
    }
}

/// Cosine similarity between two equal-length embeddings. Duplicated in
/// miniature from `sme-rag-rag::vector_store`'s private helper of the same
/// shape, since that crate does not export it and a classifier-crate
/// dependency on `rag` purely for this one function would invert the
/// dependency graph (`rag` already depends on neither `config` nor `llm`'s
/// embedding client in a way that would help here).
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn keyword_hit(profile: &DomainProfile, query: &str) -> bool {
    if profile.keywords.iter().any(|kw| query.contains(kw.as_str())) {
        return true;
    }
    profile.compound_rules.iter().any(|rule| rule.tokens.iter().all(|t| query.contains(t.as_str())))
}

/// Select the co-selected domain set from per-domain scores: the top
/// score, plus any domain within `multi_domain_gap` of it, sorted by
/// tie-break precedence and capped at 3 (`ClassificationResult::accepted`
/// enforces the cap). Domains with zero score never qualify.
fn select_domains(scores: &HashMap<Domain, f32>, gap: f32) -> Vec<Domain> {
    let max_score = scores.values().cloned().fold(0.0_f32, f32::max);
    if max_score <= 0.0 {
        return Vec::new();
    }
    let mut selected: Vec<Domain> =
        scores.iter().filter(|(_, &score)| score > 0.0 && score >= max_score - gap).map(|(&d, _)| d).collect();
    sme_rag_core::sort_domains(std::mem::take(&mut selected))
}

/// Domain classifier: hybrid keyword + vector-centroid scoring, with an
/// optional LLM-only front path.
pub struct DomainClassifier {
    llm: Arc<dyn LanguageModel>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
    profiles: &'static DomainProfileTable,
    config: ClassifierConfig,
    centroids: RwLock<HashMap<Domain, Vec<f32>>>,
}

impl DomainClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>, embedder: Arc<dyn EmbeddingClient>, config: ClassifierConfig) -> Self {
        Self {
            llm,
            embedder: Some(embedder),
            profiles: domain_profiles(),
            config,
            centroids: RwLock::new(HashMap::new()),
        }
    }

    /// Keyword-only classifier, used when no embedding backend is wired up
    /// (also the degraded mode the hybrid path falls back to on embedding
    /// failure).
    pub fn keyword_only(llm: Arc<dyn LanguageModel>, config: ClassifierConfig) -> Self {
        Self { llm, embedder: None, profiles: domain_profiles(), config, centroids: RwLock::new(HashMap::new()) }
    }

    pub async fn classify(&self, query: &str) -> ClassificationResult {
        if self.config.mode == ClassifierMode::LlmOnly {
            match tokio::time::timeout(self.config.llm_timeout, self.classify_llm(query)).await {
                Ok(Some(result)) => return result,
                Ok(None) | Err(_) => warn!("llm_only classification failed or timed out, falling back to hybrid"),
            }
        }
        self.classify_hybrid(query).await
    }

    async fn classify_hybrid(&self, query: &str) -> ClassificationResult {
        let keyword_hits: HashMap<Domain, bool> = EXPERT_DOMAINS
            .iter()
            .map(|&domain| {
                let hit = self.profiles.get(domain).map(|p| keyword_hit(&p, query)).unwrap_or(false);
                (domain, hit)
            })
            .collect();
        let any_keyword_hit = keyword_hits.values().any(|&hit| hit);

        let Some(embedder) = &self.embedder else {
            return self.score_from(keyword_hits.into_iter().map(|(d, hit)| (d, if hit { 1.0 } else { 0.0 })).collect(), ClassificationSource::Keyword);
        };

        let query_embedding = match embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "embedding failed during classification, degrading to keyword-only");
                return self.score_from(
                    keyword_hits.into_iter().map(|(d, hit)| (d, if hit { 1.0 } else { 0.0 })).collect(),
                    ClassificationSource::Keyword,
                );
            }
        };

        let mut similarities = HashMap::new();
        for &domain in &EXPERT_DOMAINS {
            let centroid = match self.centroid_for(domain, embedder.as_ref()).await {
                Some(c) => c,
                None => continue,
            };
            similarities.insert(domain, cosine_similarity(&query_embedding, &centroid));
        }
        let max_similarity = similarities.values().cloned().fold(0.0_f32, f32::max);

        if !any_keyword_hit && max_similarity < self.config.rejection_vector_threshold {
            return ClassificationResult::rejection(ClassificationSource::Merged);
        }

        let scores: HashMap<Domain, f32> = EXPERT_DOMAINS
            .iter()
            .map(|&domain| {
                let sim = similarities.get(&domain).cloned().unwrap_or(0.0);
                let boost = if keyword_hits.get(&domain).cloned().unwrap_or(false) {
                    self.config.keyword_confidence_boost
                } else {
                    0.0
                };
                (domain, (sim + boost).clamp(0.0, 1.0))
            })
            .collect();
        self.score_from(scores, ClassificationSource::Merged)
    }

    fn score_from(&self, scores: HashMap<Domain, f32>, source: ClassificationSource) -> ClassificationResult {
        let domains = select_domains(&scores, self.config.multi_domain_gap);
        if domains.is_empty() {
            // Empty output: route to law_common as general rather than reject
            // outright, per §4.5's distinct "empty output" failure mode.
            let mut confidences = HashMap::new();
            confidences.insert(Domain::General, 0.0);
            return ClassificationResult::accepted(vec![Domain::General], confidences, source);
        }
        ClassificationResult::accepted(domains, scores, source)
    }

    /// Double-checked-lock centroid lookup: the mean of the embeddings of a
    /// domain's representative queries, computed once and cached.
    async fn centroid_for(&self, domain: Domain, embedder: &dyn EmbeddingClient) -> Option<Vec<f32>> {
        if let Some(cached) = self.centroids.read().get(&domain) {
            return Some(cached.clone());
        }
        let profile = self.profiles.get(domain)?;
        if profile.representative_queries.is_empty() {
            return None;
        }
        let mut sum: Vec<f32> = Vec::new();
        let mut count = 0;
        for rq in &profile.representative_queries {
            match embedder.embed(rq).await {
                Ok(embedding) => {
                    if sum.is_empty() {
                        sum = vec![0.0; embedding.len()];
                    }
                    for (s, v) in sum.iter_mut().zip(&embedding) {
                        *s += v;
                    }
                    count += 1;
                }
                Err(e) => warn!(error = %e, %domain, "failed embedding representative query for centroid"),
            }
        }
        if count == 0 {
            return None;
        }
        for s in &mut sum {
            *s /= count as f32;
        }
        self.centroids.write().insert(domain, sum.clone());
        Some(sum)
    }

    /// LLM-only classification: ask the chat model for a direct JSON verdict.
    /// Returns `None` on an unparseable response so the caller falls back.
    async fn classify_llm(&self, query: &str) -> Option<ClassificationResult> {
        let system = "사용자 질문을 다음 네 가지 전문 상담 영역 중 하나 이상으로 분류하세요: \
            startup_funding(창업·지원사업), finance_tax(재무·세무), hr_labor(인사·노무), law_common(법률). \
            질문이 이 네 영역 모두와 무관하면 거부해야 합니다. 다른 설명 없이 다음 JSON 형식으로만 답하세요: \
            {\"domains\": [\"finance_tax\"], \"is_rejection\": false}";
        let request = GenerateRequest::new(system).with_user_message(query).with_temperature(0.0).with_max_tokens(200);
        let response = self.llm.generate(request).await.ok()?;
        parse_llm_verdict(&response.text)
    }
}

fn parse_llm_verdict(text: &str) -> Option<ClassificationResult> {
    let json_start = text.find('{')?;
    let json_end = text.rfind('}')?;
    let value: serde_json::Value = serde_json::from_str(&text[json_start..=json_end]).ok()?;

    if value.get("is_rejection").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Some(ClassificationResult::rejection(ClassificationSource::Llm));
    }
    let domains: Vec<Domain> = value
        .get("domains")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str())
        .filter_map(parse_domain_name)
        .collect();
    if domains.is_empty() {
        return None;
    }
    let confidences = domains.iter().map(|&d| (d, 1.0)).collect();
    Some(ClassificationResult::accepted(domains, confidences, ClassificationSource::Llm))
}

fn parse_domain_name(s: &str) -> Option<Domain> {
    match s {
        "startup_funding" => Some(Domain::StartupFunding),
        "finance_tax" => Some(Domain::FinanceTax),
        "hr_labor" => Some(Domain::HrLabor),
        "law_common" => Some(Domain::LawCommon),
        _ => None,
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

    #[test]
    fn test_select_domains_picks_top_and_gap_co_selection() {
        let mut scores = HashMap::new();
        scores.insert(Domain::FinanceTax, 0.9);
        scores.insert(Domain::HrLabor, 0.85);
        scores.insert(Domain::LawCommon, 0.2);
        let domains = select_domains(&scores, 0.1);
        assert_eq!(domains, vec![Domain::FinanceTax, Domain::HrLabor]);
    }

    #[test]
    fn test_select_domains_empty_when_all_zero() {
        let mut scores = HashMap::new();
        scores.insert(Domain::FinanceTax, 0.0);
        assert!(select_domains(&scores, 0.1).is_empty());
    }

    #[test]
    fn test_keyword_hit_detects_compound_rule() {
        let profile = domain_profiles().get(Domain::StartupFunding).unwrap();
        assert!(keyword_hit(&profile, "지원을 받는 기업이 되려면 어떻게 하나요"));
    }

    #[tokio::test]
    async fn test_classify_keyword_only_finance_tax() {
        let classifier =
            DomainClassifier::keyword_only(Arc::new(MockLlm(String::new())), ClassifierConfig::default());
        let result = classifier.classify("부가세 신고 기한이 언제인가요?").await;
        assert!(!result.is_rejection);
        assert!(result.domains.contains(&Domain::FinanceTax));
    }

    #[tokio::test]
    async fn test_classify_keyword_only_rejects_unrelated() {
        let classifier =
            DomainClassifier::keyword_only(Arc::new(MockLlm(String::new())), ClassifierConfig::default());
        let result = classifier.classify("오늘 날씨가 어떤가요?").await;
        assert_eq!(result.domains, vec![Domain::General]);
    }

    #[test]
    fn test_parse_llm_verdict_rejection() {
        let result = parse_llm_verdict(r#"{"domains": [], "is_rejection": true}"#).unwrap();
        assert!(result.is_rejection);
    }

    #[test]
    fn test_parse_llm_verdict_accepted() {
        let result = parse_llm_verdict(r#"Here you go: {"domains": ["finance_tax", "hr_labor"], "is_rejection": false}"#).unwrap();
        assert_eq!(result.domains, vec![Domain::FinanceTax, Domain::HrLabor]);
    }

    #[test]
    fn test_parse_llm_verdict_unparseable_returns_none() {
        assert!(parse_llm_verdict("no json here").is_none());
    }
}
