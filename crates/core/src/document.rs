//! Retrieved documents and source citations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A scalar metadata value (source, title, domain, chunk_index, parent_id, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Str(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Str(s)
    }
}

impl From<i64> for MetaValue {
    fn from(n: i64) -> Self {
        MetaValue::Int(n)
    }
}

impl From<f64> for MetaValue {
    fn from(n: f64) -> Self {
        MetaValue::Float(n)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        MetaValue::Bool(b)
    }
}

/// An immutable retrieved document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: HashMap<String, MetaValue>,
}

/// Number of leading bytes hashed for the dedup fingerprint.
///
/// P2: this intentionally preserves a documented weakness — two documents
/// sharing a 500-byte prefix collide and are treated as duplicates. The
/// spec calls this out as "dedup by implementation-defined content
/// fingerprint"; do not silently widen it to a full-content hash (see
/// DESIGN.md Open Questions).
pub const DEDUP_PREFIX_BYTES: usize = 500;

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), metadata: HashMap::new() }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(|v| v.as_str())
    }

    /// Deduplication fingerprint: hash of the first `DEDUP_PREFIX_BYTES`
    /// bytes of content.
    pub fn dedup_key(&self) -> u64 {
        let prefix_len = self.content.len().min(DEDUP_PREFIX_BYTES);
        // Use a char boundary at or below prefix_len so we never slice mid-codepoint.
        let mut boundary = prefix_len;
        while boundary > 0 && !self.content.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let mut hasher = DefaultHasher::new();
        self.content[..boundary].hash(&mut hasher);
        hasher.finish()
    }
}

/// Deduplicate documents by `dedup_key`, keeping the first occurrence
/// (stable order, matching the ordering guarantee in spec §8).
pub fn dedup_documents(docs: Vec<Document>) -> Vec<Document> {
    let mut seen = std::collections::HashSet::new();
    docs.into_iter()
        .filter(|d| seen.insert(d.dedup_key()))
        .collect()
}

/// A citation surfaced alongside the generated answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCitation {
    pub title: Option<String>,
    pub content_snippet: String,
    pub source_uri: String,
    pub metadata: HashMap<String, MetaValue>,
}

impl SourceCitation {
    pub fn from_document(doc: &Document, snippet_chars: usize) -> Self {
        let content_snippet: String = doc.content.chars().take(snippet_chars).collect();
        Self {
            title: doc.title().map(|s| s.to_string()),
            content_snippet,
            source_uri: doc.source().unwrap_or("unknown").to_string(),
            metadata: doc.metadata.clone(),
        }
    }
}

/// Deduplicate citations by `source_uri` across domains, stable order.
pub fn dedup_citations(citations: Vec<SourceCitation>) -> Vec<SourceCitation> {
    let mut seen = std::collections::HashSet::new();
    citations
        .into_iter()
        .filter(|c| seen.insert(c.source_uri.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_collision_is_preserved_behavior() {
        let long_prefix = "가".repeat(600);
        let doc1 = Document::new(format!("{long_prefix}첫 번째 꼬리"));
        let doc2 = Document::new(format!("{long_prefix}두 번째 꼬리"));
        // Both share >500 bytes of prefix content, so they collide by design.
        assert_eq!(doc1.dedup_key(), doc2.dedup_key());
    }

    #[test]
    fn test_distinct_short_documents_do_not_collide() {
        let doc1 = Document::new("부가세 신고 기한");
        let doc2 = Document::new("근로계약서 작성 방법");
        assert_ne!(doc1.dedup_key(), doc2.dedup_key());
    }

    #[test]
    fn test_dedup_documents_keeps_first() {
        let docs = vec![
            Document::new("동일 내용").with_meta("source", "a.md"),
            Document::new("동일 내용").with_meta("source", "b.md"),
        ];
        let deduped = dedup_documents(docs);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].source(), Some("a.md"));
    }

    #[test]
    fn test_dedup_citations_by_source_uri() {
        let citations = vec![
            SourceCitation {
                title: None,
                content_snippet: "a".into(),
                source_uri: "doc-1".into(),
                metadata: HashMap::new(),
            },
            SourceCitation {
                title: None,
                content_snippet: "b".into(),
                source_uri: "doc-1".into(),
                metadata: HashMap::new(),
            },
        ];
        assert_eq!(dedup_citations(citations).len(), 1);
    }
}
