//! Response Cache (component L12, §4.11)
//!
//! LRU capacity 500, TTL 1h, keyed by SHA256 of
//! `(sanitized_query, sorted(domains), hash(history[-3:]))`. On hit the
//! stored `Generation`/`EvaluationResult` is returned without re-running
//! any stage; streaming hits replay the stored event sequence so the
//! ordering invariant (§8) still holds on a cache hit.

use std::time::Duration;

use sha2::{Digest, Sha256};

use sme_rag_core::{sort_domains, Domain, EvaluationResult, Generation, Turn};
use sme_rag_llm::LruCache;

const CAPACITY: usize = 500;
const TTL: Duration = Duration::from_secs(3600);
/// Number of trailing history turns folded into the cache key (§9: the
/// cache key is intentionally history-sensitive; see DESIGN.md).
const HISTORY_TAIL: usize = 3;

/// What a cache hit restores without re-running any stage.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub domains: Vec<Domain>,
    pub generation: Generation,
    pub evaluation: Option<EvaluationResult>,
}

/// Build the cache key for `(sanitized_query, domains, history tail)`.
pub fn cache_key(sanitized_query: &str, domains: &[Domain], history: &[Turn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sanitized_query.as_bytes());
    hasher.update([0u8]);

    let sorted = sort_domains(domains.to_vec());
    for domain in &sorted {
        hasher.update(domain.as_str().as_bytes());
        hasher.update([0u8]);
    }

    let tail = sme_rag_core::last_n(history, HISTORY_TAIL);
    for turn in tail {
        hasher.update(turn.role.as_str().as_bytes());
        hasher.update(turn.content.as_bytes());
        hasher.update([0u8]);
    }

    format!("{:x}", hasher.finalize())
}

pub struct ResponseCache {
    inner: LruCache<String, CachedResponse>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self { inner: LruCache::with_ttl(CAPACITY, TTL) }
    }

    pub fn get(&self, sanitized_query: &str, domains: &[Domain], history: &[Turn]) -> Option<CachedResponse> {
        let key = cache_key(sanitized_query, domains, history);
        self.inner.get(&key)
    }

    pub fn put(&self, sanitized_query: &str, domains: &[Domain], history: &[Turn], response: CachedResponse) {
        let key = cache_key(sanitized_query, domains, history);
        self.inner.put(key, response);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn generation(content: &str) -> Generation {
        Generation { content: content.to_string(), actions: Vec::new(), sources: Vec::new() }
    }

    #[test]
    fn test_cache_idempotence_same_inputs_hit() {
        let cache = ResponseCache::new();
        let domains = vec![Domain::FinanceTax];
        let history = vec![Turn::user("안녕하세요")];
        cache.put(
            "부가세 신고 기한",
            &domains,
            &history,
            CachedResponse { domains: domains.clone(), generation: generation("7월 25일입니다"), evaluation: None },
        );
        let hit = cache.get("부가세 신고 기한", &domains, &history).unwrap();
        assert_eq!(hit.generation.content, "7월 25일입니다");
    }

    #[test]
    fn test_domain_order_does_not_affect_key() {
        let history = vec![];
        let key_a = cache_key("질문", &[Domain::HrLabor, Domain::FinanceTax], &history);
        let key_b = cache_key("질문", &[Domain::FinanceTax, Domain::HrLabor], &history);
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn test_different_history_misses_cache() {
        let history_a = vec![Turn::assistant("세무서에서 처리합니다")];
        let history_b = vec![Turn::assistant("홈택스에서 처리합니다")];
        let key_a = cache_key("그럼 필요 서류는?", &[Domain::FinanceTax], &history_a);
        let key_b = cache_key("그럼 필요 서류는?", &[Domain::FinanceTax], &history_b);
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn test_miss_on_uncached_query() {
        let cache = ResponseCache::new();
        assert!(cache.get("캐시에 없는 질문", &[Domain::LawCommon], &[]).is_none());
    }
}
