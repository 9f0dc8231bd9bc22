//! Streaming protocol events (component L10 streaming half, §4.9/§4.12)
//!
//! `stream()` mirrors `process()` but emits a typed, strictly ordered
//! event sequence instead of building a `Generation` in place: `source*`
//! events precede `token+` events precede `action*` events precede exactly
//! one terminal `done` event (§8 ordering invariant). A rejection verdict
//! collapses this to a single `token` carrying the fixed refusal message
//! and no `source` events.

use serde::{Deserialize, Serialize};

use crate::action::ActionSuggestion;
use crate::document::SourceCitation;
use crate::domain::Domain;

/// Metadata carried on the terminal `done` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoneMetadata {
    pub domains: Vec<Domain>,
    pub response_time_ms: u64,
}

/// One event in the `stream()` output sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Source(SourceCitation),
    Token { content: String },
    Action(ActionSuggestion),
    Done(DoneMetadata),
    Error { message: String },
}

impl StreamEvent {
    pub fn token(content: impl Into<String>) -> Self {
        StreamEvent::Token { content: content.into() }
    }

    pub fn done(domains: Vec<Domain>, response_time_ms: u64) -> Self {
        StreamEvent::Done(DoneMetadata { domains, response_time_ms })
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error { message: message.into() }
    }
}
