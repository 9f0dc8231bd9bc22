//! Evaluator (LLM-judge) output types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The five fixed evaluation criteria (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Relevance,
    Faithfulness,
    Completeness,
    Clarity,
    CitationDiscipline,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Criterion::Relevance,
        Criterion::Faithfulness,
        Criterion::Completeness,
        Criterion::Clarity,
        Criterion::CitationDiscipline,
    ];
}

/// Default pass threshold for the weighted-mean total score.
pub const DEFAULT_PASS_THRESHOLD: f32 = 6.5;
/// Minimum faithfulness score required even if the total clears threshold.
pub const MIN_FAITHFULNESS: f32 = 5.5;

/// Result of judging a generated answer against its supporting documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub scores: HashMap<Criterion, f32>,
    pub total_score: f32,
    pub passed: bool,
    pub feedback: Option<String>,
}

impl EvaluationResult {
    /// Compute `passed` from scores using the spec's two-part rule:
    /// `total >= threshold AND faithfulness >= MIN_FAITHFULNESS`.
    pub fn from_scores(
        scores: HashMap<Criterion, f32>,
        feedback: Option<String>,
        threshold: f32,
    ) -> Self {
        let total_score = if scores.is_empty() {
            0.0
        } else {
            scores.values().sum::<f32>() / scores.len() as f32
        };
        let faithfulness = scores.get(&Criterion::Faithfulness).copied().unwrap_or(0.0);
        let passed = total_score >= threshold && faithfulness >= MIN_FAITHFULNESS;
        Self { scores, total_score, passed, feedback }
    }

    /// The fallback verdict when the judge's output is unparseable: passes
    /// to avoid false-retry storms, per spec §4.10.
    pub fn unparseable() -> Self {
        Self {
            scores: HashMap::new(),
            total_score: 0.0,
            passed: true,
            feedback: Some("unparseable".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(relevance: f32, faithfulness: f32) -> HashMap<Criterion, f32> {
        let mut m = HashMap::new();
        m.insert(Criterion::Relevance, relevance);
        m.insert(Criterion::Faithfulness, faithfulness);
        m.insert(Criterion::Completeness, 7.0);
        m.insert(Criterion::Clarity, 7.0);
        m.insert(Criterion::CitationDiscipline, 7.0);
        m
    }

    #[test]
    fn test_passes_when_total_and_faithfulness_clear_threshold() {
        let eval = EvaluationResult::from_scores(scores(8.0, 7.0), None, DEFAULT_PASS_THRESHOLD);
        assert!(eval.passed);
    }

    #[test]
    fn test_fails_on_low_faithfulness_even_if_total_high() {
        let eval = EvaluationResult::from_scores(scores(9.0, 3.0), None, DEFAULT_PASS_THRESHOLD);
        assert!(!eval.passed);
    }

    #[test]
    fn test_unparseable_passes_to_avoid_retry_storm() {
        let eval = EvaluationResult::unparseable();
        assert!(eval.passed);
        assert_eq!(eval.total_score, 0.0);
    }
}
