//! Prompt assembly (component L1 support, feeds L10 Response Generator)
//!
//! Generalizes the teacher's `PromptBuilder` section-assembly pattern
//! (system prompt, then context, then history, then the current turn)
//! from its fixed persona/stage sections to the spec's domain-prompt and
//! retrieved-context sections. Builds directly on `sme_rag_core::Message`
//! rather than a crate-local duplicate type.

use sme_rag_core::{ActionSuggestion, Document, Message, Turn};

/// Assembles the final `Vec<Message>` sent to the chat LLM client for a
/// single-domain or multi-domain generation call.
///
/// Section order mirrors the teacher's `system_prompt -> with_context ->
/// with_history -> user_message` chain: injection guard and domain role
/// first, then numbered context documents, then prior turns, then the
/// current (possibly rewritten) query last so it has the most recency.
pub struct PromptBuilder {
    messages: Vec<Message>,
}

impl PromptBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self { messages: vec![Message::system(system_prompt)] }
    }

    /// Append the numbered retrieved-context section referenced by the
    /// `[N]` inline citation markers the domain prompts require.
    pub fn with_context(mut self, documents: &[Document]) -> Self {
        if documents.is_empty() {
            return self;
        }
        let mut section = String::from("## 참고 자료\n");
        for (idx, doc) in documents.iter().enumerate() {
            let title = doc.title().unwrap_or("제목 없음");
            section.push_str(&format!("[{}] {}\n{}\n\n", idx + 1, title, doc.content));
        }
        self.messages.push(Message::system(section));
        self
    }

    /// Same as `with_context` but labels each document's domain section,
    /// used for the multi-domain synthesis prompt (§4.9).
    pub fn with_domain_context(mut self, sections: &[(sme_rag_core::Domain, Vec<Document>)]) -> Self {
        if sections.iter().all(|(_, docs)| docs.is_empty()) {
            return self;
        }
        let mut section = String::from("## 참고 자료\n");
        let mut counter = 1;
        for (domain, documents) in sections {
            if documents.is_empty() {
                continue;
            }
            section.push_str(&format!("### {domain}\n"));
            for doc in documents {
                let title = doc.title().unwrap_or("제목 없음");
                section.push_str(&format!("[{counter}] {title}\n{}\n\n", doc.content));
                counter += 1;
            }
        }
        self.messages.push(Message::system(section));
        self
    }

    /// Append prior conversation turns verbatim, oldest first.
    pub fn with_history(mut self, history: &[Turn]) -> Self {
        for turn in history {
            let message = match turn.role {
                sme_rag_core::TurnRole::User => Message::user(turn.content.clone()),
                sme_rag_core::TurnRole::Assistant => Message::assistant(turn.content.clone()),
            };
            self.messages.push(message);
        }
        self
    }

    /// Append a system hint naming the actions available for this turn, so
    /// the model can reference them naturally in its answer (§4.9
    /// "actions are collected before generation so the answer can
    /// reference them"). No-op when there are no actions to hint at.
    pub fn with_action_hint(mut self, actions: &[ActionSuggestion]) -> Self {
        if actions.is_empty() {
            return self;
        }
        let mut section = String::from("## 이용 가능한 후속 작업\n답변 말미에서 아래 작업을 자연스럽게 언급하세요.\n");
        for action in actions {
            section.push_str(&format!("- {}\n", action.label));
        }
        self.messages.push(Message::system(section));
        self
    }

    /// Append the current (rewritten) user query as the final message.
    pub fn user_message(mut self, query: impl Into<String>) -> Self {
        self.messages.push(Message::user(query));
        self
    }

    pub fn build(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sme_rag_core::Domain;

    #[test]
    fn test_context_numbered_sequentially() {
        let docs = vec![Document::new("첫 문서").with_meta("title", "A"), Document::new("둘째 문서").with_meta("title", "B")];
        let messages = PromptBuilder::new("system").with_context(&docs).user_message("질문").build();
        let context_msg = &messages[1].content;
        assert!(context_msg.contains("[1] A"));
        assert!(context_msg.contains("[2] B"));
    }

    #[test]
    fn test_empty_context_adds_no_section() {
        let messages = PromptBuilder::new("system").with_context(&[]).user_message("질문").build();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_domain_context_groups_by_domain_header() {
        let sections = vec![
            (Domain::FinanceTax, vec![Document::new("세무 문서").with_meta("title", "세무1")]),
            (Domain::HrLabor, vec![Document::new("노무 문서").with_meta("title", "노무1")]),
        ];
        let messages = PromptBuilder::new("system").with_domain_context(&sections).user_message("질문").build();
        let context_msg = &messages[1].content;
        assert!(context_msg.contains("### finance_tax"));
        assert!(context_msg.contains("### hr_labor"));
        assert!(context_msg.contains("[1]"));
        assert!(context_msg.contains("[2]"));
    }

    #[test]
    fn test_action_hint_lists_labels() {
        use sme_rag_core::ActionSuggestion;
        let actions = vec![ActionSuggestion::new("generate_contract", "근로계약서 자동 생성")];
        let messages = PromptBuilder::new("system").with_action_hint(&actions).user_message("질문").build();
        assert_eq!(messages.len(), 3);
        assert!(messages[1].content.contains("근로계약서 자동 생성"));
    }

    #[test]
    fn test_empty_action_hint_adds_no_section() {
        let messages = PromptBuilder::new("system").with_action_hint(&[]).user_message("질문").build();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_message_order_is_system_context_history_user() {
        let history = vec![Turn::user("이전 질문"), Turn::assistant("이전 답변")];
        let messages = PromptBuilder::new("system")
            .with_context(&[Document::new("문서")])
            .with_history(&history)
            .user_message("현재 질문")
            .build();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages.last().unwrap().content, "현재 질문");
    }
}
