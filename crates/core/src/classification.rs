//! Classifier output types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::Domain;

/// Which path produced a `ClassificationResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Keyword,
    Vector,
    Llm,
    Merged,
}

/// Result of domain classification.
///
/// Invariant: if `is_rejection` is true, `domains == [Domain::Rejection]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub domains: Vec<Domain>,
    pub is_rejection: bool,
    pub confidences: HashMap<Domain, f32>,
    pub source: ClassificationSource,
}

impl ClassificationResult {
    /// Construct the terminal rejection verdict.
    pub fn rejection(source: ClassificationSource) -> Self {
        Self {
            domains: vec![Domain::Rejection],
            is_rejection: true,
            confidences: HashMap::new(),
            source,
        }
    }

    /// Construct a verdict for one or more accepted domains (capped at 3,
    /// per spec: "capped at 3 domains").
    pub fn accepted(
        mut domains: Vec<Domain>,
        confidences: HashMap<Domain, f32>,
        source: ClassificationSource,
    ) -> Self {
        domains.truncate(3);
        Self {
            domains,
            is_rejection: false,
            confidences,
            source,
        }
    }

    /// Validate the invariant linking `is_rejection` to `domains`.
    pub fn is_consistent(&self) -> bool {
        if self.is_rejection {
            self.domains == [Domain::Rejection]
        } else {
            !self.domains.contains(&Domain::Rejection) && self.domains.len() <= 3
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_is_consistent() {
        let r = ClassificationResult::rejection(ClassificationSource::Keyword);
        assert!(r.is_consistent());
        assert!(r.is_rejection);
    }

    #[test]
    fn test_accepted_caps_at_three() {
        let r = ClassificationResult::accepted(
            vec![
                Domain::StartupFunding,
                Domain::FinanceTax,
                Domain::HrLabor,
                Domain::LawCommon,
            ],
            HashMap::new(),
            ClassificationSource::Merged,
        );
        assert_eq!(r.domains.len(), 3);
        assert!(r.is_consistent());
    }
}
