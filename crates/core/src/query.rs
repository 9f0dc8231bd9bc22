//! Query validation
//!
//! A `Query` wraps the raw user string and enforces the length/emptiness
//! invariants from spec §3 before it ever reaches the sanitizer. Sanitization
//! itself (prompt-injection masking, PII redaction) lives in `sme-rag-text`,
//! which takes a validated `Query` and returns a `(masked_text, was_modified,
//! reasons)` triple.

use crate::error::Error;

/// Maximum accepted query length, in `char`s (not bytes — Korean text is
/// multi-byte in UTF-8 and the spec's 1,000 limit is a character count).
pub const MAX_QUERY_CHARS: usize = 1_000;

/// A validated, non-empty, length-bounded user query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    /// Validate and construct a `Query`. Trims surrounding whitespace before
    /// checking emptiness and length, per spec: "must not be empty after
    /// trim; max 1,000 chars".
    pub fn new(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::Input("query is empty after trimming".to_string()));
        }
        let char_count = trimmed.chars().count();
        if char_count > MAX_QUERY_CHARS {
            return Err(Error::Input(format!(
                "query exceeds {} characters (got {})",
                MAX_QUERY_CHARS, char_count
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_after_trim_rejected() {
        assert!(Query::new("   ").is_err());
        assert!(Query::new("").is_err());
    }

    #[test]
    fn test_max_length_boundary() {
        let exactly_max = "가".repeat(MAX_QUERY_CHARS);
        assert!(Query::new(exactly_max).is_ok());

        let over_max = "가".repeat(MAX_QUERY_CHARS + 1);
        assert!(Query::new(over_max).is_err());
    }

    #[test]
    fn test_trims_whitespace() {
        let q = Query::new("  부가세 신고 기한이 언제인가요?  ").unwrap();
        assert_eq!(q.as_str(), "부가세 신고 기한이 언제인가요?");
    }
}
