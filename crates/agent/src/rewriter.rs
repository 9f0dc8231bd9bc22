//! Query rewriter (component L8, §4.7)
//!
//! Follow-up questions ("그럼 거기는 어떻게 되나요?") are rewritten into a
//! standalone query using recent conversation history before
//! classification runs on them. The rewrite is skipped — cheaply, without
//! an LLM call — when there is no history to rewrite against, or when the
//! current query already names a domain keyword absent from history (the
//! user has started a new topic, not a follow-up).

use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use sme_rag_config::domain_profile::domain_profiles;
use sme_rag_core::{GenerateRequest, LanguageModel, QueryRewriteMeta, Turn, EXPERT_DOMAINS};

#[derive(Debug, Clone)]
pub struct RewriterConfig {
    /// How many trailing history turns are shown to the rewriting LLM call.
    pub history_turns: usize,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self { history_turns: 4 }
    }
}

pub struct QueryRewriter {
    llm: Arc<dyn LanguageModel>,
    config: RewriterConfig,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LanguageModel>, config: RewriterConfig) -> Self {
        Self { llm, config }
    }

    pub async fn rewrite(&self, query: &str, history: &[Turn]) -> (String, QueryRewriteMeta) {
        let start = Instant::now();

        if history.is_empty() {
            return (query.to_string(), skip("no_history", start));
        }
        if let Some(new_topic_keyword) = new_topic_keyword(query, history) {
            return (query.to_string(), skip(&format!("new_topic_keyword:{new_topic_keyword}"), start));
        }

        let recent = sme_rag_core::last_n(history, self.config.history_turns);
        let transcript = recent
            .iter()
            .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
            .collect::<Vec<_>>()
            .join("\n");
        let system = "아래는 이전 대화입니다. 사용자의 마지막 질문이 앞선 대화를 전제로 한 후속 질문(대명사, 지시어, 생략된 주어 포함)이면, \
            대화 없이도 이해할 수 있는 완전한 독립 질문으로 다시 쓰세요. 질문 자체만 출력하고 다른 설명은 하지 마세요.";
        let request = GenerateRequest::new(format!("{system}\n\n## 이전 대화\n{transcript}"))
            .with_user_message(query)
            .with_temperature(0.0)
            .with_max_tokens(200);

        match self.llm.generate(request).await {
            Ok(response) => {
                let rewritten = response.text.trim().trim_matches('"').to_string();
                if rewritten.is_empty() {
                    (query.to_string(), skip("empty_llm_response", start))
                } else {
                    (
                        rewritten,
                        QueryRewriteMeta { applied: true, reason: "anaphoric_followup".to_string(), time_ms: elapsed_ms(start) },
                    )
                }
            }
            Err(e) => {
                warn!(error = %e, "query rewrite LLM call failed, using original query");
                (query.to_string(), skip("llm_unavailable", start))
            }
        }
    }
}

fn skip(reason: &str, start: Instant) -> QueryRewriteMeta {
    QueryRewriteMeta { applied: false, reason: reason.to_string(), time_ms: elapsed_ms(start) }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// If the query contains a domain keyword not present anywhere in history,
/// returns that keyword: evidence the user switched topics rather than
/// following up. Otherwise `None`.
fn new_topic_keyword(query: &str, history: &[Turn]) -> Option<String> {
    let history_text: String = history.iter().map(|t| t.content.as_str()).collect::<Vec<_>>().join(" ");
    let profiles = domain_profiles();
    for domain in EXPERT_DOMAINS {
        let Some(profile) = profiles.get(domain) else { continue };
        for keyword in &profile.keywords {
            if query.contains(keyword.as_str()) && !history_text.contains(keyword.as_str()) {
                return Some(keyword.clone());
            }
        }
    }
    None
}
