//! Korean PII detection for observability (§4.1)
//!
//! This pass runs only on text bound for logs/traces; the LLM always
//! receives the user's original (sanitized-for-injection, not
//! PII-redacted) text, because identity is trusted for answering and
//! only needs to be hidden from operators reading logs.

use once_cell::sync::Lazy;
use regex::Regex;

use sme_rag_core::pii::{PIIEntity, PIIType, RedactionStrategy};

struct PiiPattern {
    regex: Regex,
    pii_type: PIIType,
}

static PII_PATTERNS: Lazy<Vec<PiiPattern>> = Lazy::new(|| {
    vec![
        PiiPattern {
            // 주민등록번호: 6 digits - 7 digits
            regex: Regex::new(r"\b\d{6}-\d{7}\b").unwrap(),
            pii_type: PIIType::ResidentRegistrationNumber,
        },
        PiiPattern {
            // 사업자등록번호: 3-2-5 digits
            regex: Regex::new(r"\b\d{3}-\d{2}-\d{5}\b").unwrap(),
            pii_type: PIIType::BusinessRegistrationNumber,
        },
        PiiPattern {
            // Korean mobile: 010-xxxx-xxxx (with or without dashes)
            regex: Regex::new(r"\b01[016789]-?\d{3,4}-?\d{4}\b").unwrap(),
            pii_type: PIIType::PhoneNumber,
        },
        PiiPattern {
            regex: Regex::new(r"\b[\w.+-]+@[\w-]+\.[\w.-]+\b").unwrap(),
            pii_type: PIIType::Email,
        },
        PiiPattern {
            // Bank account: 10-14 digit run, with optional dash separators
            regex: Regex::new(r"\b\d{2,6}-?\d{2,6}-?\d{2,8}\b").unwrap(),
            pii_type: PIIType::BankAccount,
        },
    ]
});

/// Detect PII entities in `text`. Order mirrors `PII_PATTERNS`; a more
/// specific pattern (resident/business registration numbers) is checked
/// before the looser bank-account catch-all so specific formats aren't
/// double-counted as bank accounts too.
pub fn detect(text: &str) -> Vec<PIIEntity> {
    let mut found = Vec::new();
    let mut covered: Vec<(usize, usize)> = Vec::new();

    for pattern in PII_PATTERNS.iter() {
        for m in pattern.regex.find_iter(text) {
            if covered.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                continue;
            }
            covered.push((m.start(), m.end()));
            found.push(PIIEntity::new(pattern.pii_type, m.as_str(), m.start(), m.end()));
        }
    }

    found.sort_by_key(|e| e.start);
    found
}

/// Mask all detected PII in `text` for inclusion in logs/traces.
pub fn mask_for_logging(text: &str) -> String {
    let entities = detect(text);
    if entities.is_empty() {
        return text.to_string();
    }

    let strategy = RedactionStrategy::default();
    let mut result = String::with_capacity(text.len());
    let mut last_end = 0;

    for entity in &entities {
        result.push_str(&text[last_end..entity.start]);
        result.push_str(&strategy.apply(&entity.text, entity.pii_type));
        last_end = entity.end;
    }
    result.push_str(&text[last_end..]);
    result
}
