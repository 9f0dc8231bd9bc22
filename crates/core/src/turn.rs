//! Conversation turns
//!
//! A `Turn` is the unit of prior conversation history threaded through
//! query rewriting and decomposition. History is an ordered, finite list of
//! turns supplied by the caller on each request (the core does not persist
//! it — persistence is an external collaborator, see `traits::persistence`).

use serde::{Deserialize, Serialize};

/// Role of the speaker in a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// A single turn of conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: TurnRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, content: content.into() }
    }

    /// Last turn before this one is the assistant's reply to rewrite against.
    pub fn is_assistant(&self) -> bool {
        matches!(self.role, TurnRole::Assistant)
    }
}

/// The last N turns, used for cache-key hashing per §9's open question
/// (the cache key is intentionally history-sensitive, see DESIGN.md).
pub fn last_n<'a>(history: &'a [Turn], n: usize) -> &'a [Turn] {
    let len = history.len();
    if len <= n { history } else { &history[len - n..] }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_roles() {
        let t = Turn::user("hello");
        assert!(!t.is_assistant());
        let t = Turn::assistant("hi");
        assert!(t.is_assistant());
    }

    #[test]
    fn test_last_n() {
        let history = vec![Turn::user("1"), Turn::assistant("2"), Turn::user("3")];
        assert_eq!(last_n(&history, 2).len(), 2);
        assert_eq!(last_n(&history, 10).len(), 3);
    }
}
