//! Retrieval strategy, retry ladder, and per-sub-query results

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::domain::Domain;

/// Retrieval strategy selected by the adaptive strategy selector (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Hybrid,
    VectorHeavy,
    Bm25Heavy,
    SemanticOnly,
    LexicalOnly,
}

impl SearchStrategy {
    /// Dense/sparse weighting for RRF fusion implied by this strategy.
    pub fn weights(&self) -> (f32, f32) {
        match self {
            SearchStrategy::Hybrid => (0.5, 0.5),
            SearchStrategy::VectorHeavy => (0.85, 0.15),
            SearchStrategy::Bm25Heavy => (0.30, 0.70),
            SearchStrategy::SemanticOnly => (1.0, 0.0),
            SearchStrategy::LexicalOnly => (0.0, 1.0),
        }
    }
}

/// Graduated retry level, L0 (initial) through L4 (best-effort partial).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum RetryLevel {
    L0Initial = 0,
    L1RelaxParams = 1,
    L2MultiQuery = 2,
    L3CrossDomain = 3,
    L4Partial = 4,
}

impl RetryLevel {
    pub fn next(&self) -> Option<RetryLevel> {
        match self {
            RetryLevel::L0Initial => Some(RetryLevel::L1RelaxParams),
            RetryLevel::L1RelaxParams => Some(RetryLevel::L2MultiQuery),
            RetryLevel::L2MultiQuery => Some(RetryLevel::L3CrossDomain),
            RetryLevel::L3CrossDomain => Some(RetryLevel::L4Partial),
            RetryLevel::L4Partial => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Outcome status of a retrieval evaluation pass (§4.8 rule-based evaluation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    Ok,
    Partial,
    Empty,
}

/// Result of retrieving documents for one sub-query in one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub domain: Domain,
    pub sub_query: String,
    pub documents: Vec<Document>,
    pub strategy_used: SearchStrategy,
    pub retry_level: RetryLevel,
    pub used_multi_query: bool,
    pub doc_count: usize,
    pub keyword_match_ratio: f32,
    pub avg_similarity: f32,
    pub status: RetrievalStatus,
}

impl RetrievalResult {
    /// Rule-based status mapping per spec §4.8:
    /// ok if match >= 0.3 AND avg_sim >= 0.4; partial if doc_count >= 1; else empty.
    pub fn classify_status(keyword_match_ratio: f32, avg_similarity: f32, doc_count: usize) -> RetrievalStatus {
        if keyword_match_ratio >= 0.3 && avg_similarity >= 0.4 {
            RetrievalStatus::Ok
        } else if doc_count >= 1 {
            RetrievalStatus::Partial
        } else {
            RetrievalStatus::Empty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_level_ladder() {
        let mut level = RetryLevel::L0Initial;
        let mut steps = 0;
        while let Some(next) = level.next() {
            assert!(next > level);
            level = next;
            steps += 1;
        }
        assert_eq!(steps, 4);
        assert_eq!(level, RetryLevel::L4Partial);
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(RetrievalResult::classify_status(0.5, 0.5, 5), RetrievalStatus::Ok);
        assert_eq!(RetrievalResult::classify_status(0.1, 0.2, 2), RetrievalStatus::Partial);
        assert_eq!(RetrievalResult::classify_status(0.0, 0.0, 0), RetrievalStatus::Empty);
    }
}
