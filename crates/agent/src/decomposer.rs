//! Question decomposer (component L7, §4.6)
//!
//! A composite query spanning more than one classified domain is split
//! into one sub-query per domain so the retrieval agent can search each
//! domain's collection with domain-appropriate phrasing. Single-domain
//! queries decompose to an identity sub-query without an LLM call. The
//! cache key is `(query, sorted domains)` and deliberately excludes
//! conversation history — decomposition only depends on the current
//! query's surface form and its classified domain set (§4.6).

use std::sync::Arc;

use tracing::warn;

use sme_rag_core::{Domain, GenerateRequest, LanguageModel, SubQuery};
use sme_rag_llm::LruCache;

#[derive(Debug, Clone)]
pub struct DecomposerConfig {
    pub cache_capacity: usize,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self { cache_capacity: 512 }
    }
}

pub struct QuestionDecomposer {
    llm: Arc<dyn LanguageModel>,
    cache: LruCache<String, Vec<SubQuery>>,
}

impl QuestionDecomposer {
    pub fn new(llm: Arc<dyn LanguageModel>, config: DecomposerConfig) -> Self {
        Self { llm, cache: LruCache::new(config.cache_capacity) }
    }

    pub async fn decompose(&self, query: &str, domains: &[Domain]) -> Vec<SubQuery> {
        if domains.len() <= 1 {
            let domain = domains.first().copied().unwrap_or(Domain::General);
            return vec![SubQuery::identity(query, domain)];
        }

        let cache_key = cache_key(query, domains);
        if let Some(cached) = self.cache.get(&cache_key) {
            return (*cached).clone();
        }

        let sub_queries = self.decompose_via_llm(query, domains).await.unwrap_or_else(|| identity_per_domain(query, domains));
        self.cache.put(cache_key, Arc::new(sub_queries.clone()));
        sub_queries
    }

    async fn decompose_via_llm(&self, query: &str, domains: &[Domain]) -> Option<Vec<SubQuery>> {
        let domain_list = domains.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", ");
        let system = format!(
            "사용자 질문은 다음 전문 영역에 걸쳐 있습니다: {domain_list}. \
            각 영역에 대해 해당 영역의 핵심 명사를 유지하면서 질문을 그 영역에 맞게 다시 쓰세요. \
            다른 설명 없이 다음 JSON 형식으로만 답하세요: {{\"sub_queries\": [{{\"domain\": \"finance_tax\", \"text\": \"...\"}}]}}"
        );
        let request = GenerateRequest::new(system).with_user_message(query).with_temperature(0.2).with_max_tokens(400);
        let response = self.llm.generate(request).await.ok()?;
        parse_decomposition(&response.text, query, domains)
    }
}

fn cache_key(query: &str, domains: &[Domain]) -> String {
    let mut names: Vec<&str> = domains.iter().map(|d| d.as_str()).collect();
    names.sort_unstable();
    format!("{query}|{}", names.join(","))
}

fn identity_per_domain(query: &str, domains: &[Domain]) -> Vec<SubQuery> {
    domains.iter().enumerate().map(|(idx, &domain)| SubQuery::new(query.to_string(), domain, idx)).collect()
}

fn parse_decomposition(text: &str, original_query: &str, domains: &[Domain]) -> Option<Vec<SubQuery>> {
    let json_start = text.find('{')?;
    let json_end = text.rfind('}')?;
    let value: serde_json::Value = serde_json::from_str(&text[json_start..=json_end]).ok()?;
    let entries = value.get("sub_queries")?.as_array()?;

    let mut by_domain: std::collections::HashMap<Domain, String> = std::collections::HashMap::new();
    for entry in entries {
        let Some(domain) = entry.get("domain").and_then(|v| v.as_str()).and_then(parse_domain_name) else {
            continue;
        };
        let Some(text) = entry.get("text").and_then(|v| v.as_str()) else { continue };
        if !text.trim().is_empty() {
            by_domain.insert(domain, text.trim().to_string());
        }
    }
    if by_domain.is_empty() {
        warn!("decomposition response carried no usable sub-query, falling back to identity per domain");
        return None;
    }

    // A domain the judge's JSON omitted still needs a sub-query to search
    // with; fall back to the original composite query for just that domain.
    Some(
        domains
            .iter()
            .enumerate()
            .map(|(idx, &domain)| {
                let text = by_domain.get(&domain).cloned().unwrap_or_else(|| original_query.to_string());
                SubQuery::new(text, domain, idx)
            })
            .collect(),
    )
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

    #[tokio::test]
    async fn test_single_domain_is_identity_without_llm_call() {
        let decomposer = QuestionDecomposer::new(Arc::new(MockLlm(String::new())), DecomposerConfig::default());
        let result = decomposer.decompose("부가세 신고 기한", &[Domain::FinanceTax]).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "부가세 신고 기한");
    }

    #[tokio::test]
    async fn test_multi_domain_falls_back_to_identity_on_unparseable_response() {
        let decomposer = QuestionDecomposer::new(Arc::new(MockLlm("not json".to_string())), DecomposerConfig::default());
        let result = decomposer.decompose("세금과 퇴직금 관련 질문", &[Domain::FinanceTax, Domain::HrLabor]).await;
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|sq| sq.text == "세금과 퇴직금 관련 질문"));
    }

    #[tokio::test]
    async fn test_multi_domain_parses_llm_decomposition() {
        let response = r#"{"sub_queries": [{"domain": "finance_tax", "text": "부가세 신고는 어떻게 하나요"}, {"domain": "hr_labor", "text": "퇴직금 계산은 어떻게 하나요"}]}"#;
        let decomposer = QuestionDecomposer::new(Arc::new(MockLlm(response.to_string())), DecomposerConfig::default());
        let result = decomposer.decompose("세금과 퇴직금 관련 질문", &[Domain::FinanceTax, Domain::HrLabor]).await;
        assert_eq!(result.len(), 2);
        assert!(result.iter().any(|sq| sq.domain == Domain::FinanceTax && sq.text.contains("부가세")));
    }

    #[test]
    fn test_cache_key_sorted_and_stable() {
        let k1 = cache_key("q", &[Domain::HrLabor, Domain::FinanceTax]);
        let k2 = cache_key("q", &[Domain::FinanceTax, Domain::HrLabor]);
        assert_eq!(k1, k2);
    }
}
