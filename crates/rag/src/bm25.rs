//! BM25 Index (component L3)
//!
//! Generalizes the teacher's `SparseIndex` from a single Hindi/English index
//! to one `tantivy` index per domain, built once under a
//! `parking_lot::RwLock`-guarded double-checked-lock init (§4.3, §5
//! "lazy, double-checked-lock init"). Tokenization keeps the teacher's
//! "multilingual" `SimpleTokenizer` registration: Korean has no stemmer
//! available in `tantivy`, so (per §4.3) Korean indexes fall back to the
//! same Unicode word-segmentation the teacher uses for Hindi, while English
//! content still gets the `Stemmer::new(Language::English)` filter.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, OwnedValue, Schema, TextFieldIndexing, TextOptions, IndexRecordOption, STORED, STRING};
use tantivy::tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument};

use sme_rag_core::{Document, Domain, Error, Result};

/// BM25 index configuration. `tantivy`'s built-in BM25 scorer does not
/// expose k1/b as tunable parameters through `QueryParser`/`TopDocs`; the
/// spec's `k1=1.5, b=0.75` is therefore documented as an aspirational
/// target approximated by tantivy's internal defaults (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct Bm25Config {
    pub top_k: usize,
    pub language: String,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { top_k: 20, language: "ko".to_string() }
    }
}

#[derive(Debug, Clone)]
pub struct Bm25Result {
    pub document: Document,
    pub score: f32,
}

struct IndexHandle {
    index: Index,
    reader: IndexReader,
    writer: RwLock<Option<IndexWriter>>,
    content_field: Field,
    title_field: Field,
    id_field: Field,
}

/// One `tantivy` index per domain, lazily built behind an `OnceCell`.
pub struct Bm25IndexTable {
    config: Bm25Config,
    indexes: RwLock<HashMap<Domain, Arc<OnceCell<IndexHandle>>>>,
}

impl Bm25IndexTable {
    pub fn new(config: Bm25Config) -> Self {
        Self { config, indexes: RwLock::new(HashMap::new()) }
    }

    fn slot(&self, domain: Domain) -> Arc<OnceCell<IndexHandle>> {
        if let Some(cell) = self.indexes.read().get(&domain) {
            return Arc::clone(cell);
        }
        let mut write = self.indexes.write();
        Arc::clone(write.entry(domain).or_insert_with(|| Arc::new(OnceCell::new())))
    }

    fn handle(&self, domain: Domain) -> Result<Arc<OnceCell<IndexHandle>>> {
        let cell = self.slot(domain);
        if cell.get().is_none() {
            let handle = Self::build_index(&self.config)?;
            let _ = cell.set(handle);
        }
        Ok(cell)
    }

    fn build_index(config: &Bm25Config) -> Result<IndexHandle> {
        let mut schema_builder = Schema::builder();
        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("multilingual")
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let content_field = schema_builder.add_text_field("content", text_options.clone());
        let title_field = schema_builder.add_text_field("title", text_options);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        index.tokenizers().register("multilingual", Self::build_tokenizer(config));

        let reader = index.reader().map_err(|e| Error::Retrieval(e.to_string()))?;
        let writer = index.writer(50_000_000).map_err(|e| Error::Retrieval(e.to_string()))?;

        Ok(IndexHandle {
            index,
            reader,
            writer: RwLock::new(Some(writer)),
            content_field,
            title_field,
            id_field,
        })
    }

    /// Korean has no `tantivy` stemmer, so it takes the same
    /// Unicode-aware `SimpleTokenizer` fallback the teacher uses for Hindi;
    /// English content still gets a real stemmer.
    fn build_tokenizer(config: &Bm25Config) -> TextAnalyzer {
        let base = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser);
        if config.language == "en" {
            base.filter(Stemmer::new(Language::English)).build()
        } else {
            if config.language != "ko" {
                tracing::warn!(language = %config.language, "no tantivy stemmer available, using simple tokenization");
            }
            base.build()
        }
    }

    pub fn index_documents(&self, domain: Domain, documents: &[Document]) -> Result<()> {
        let cell = self.handle(domain)?;
        let handle = cell.get().expect("index initialized above");

        let mut writer_guard = handle.writer.write();
        let writer = writer_guard
            .as_mut()
            .ok_or_else(|| Error::Retrieval("bm25 writer unavailable".to_string()))?;

        for (idx, doc) in documents.iter().enumerate() {
            let mut tantivy_doc = TantivyDocument::default();
            tantivy_doc.add_text(handle.id_field, doc.source().unwrap_or(&idx.to_string()));
            tantivy_doc.add_text(handle.content_field, &doc.content);
            if let Some(title) = doc.title() {
                tantivy_doc.add_text(handle.title_field, title);
            }
            writer.add_document(tantivy_doc).map_err(|e| Error::Retrieval(e.to_string()))?;
        }
        writer.commit().map_err(|e| Error::Retrieval(e.to_string()))?;
        handle.reader.reload().map_err(|e| Error::Retrieval(e.to_string()))?;
        Ok(())
    }

    /// Thread-safe read; readers take no lock beyond the `tantivy` reader's
    /// own internal snapshot (§5: "readers take no lock").
    pub fn search(&self, domain: Domain, query: &str, top_k: Option<usize>) -> Result<Vec<Bm25Result>> {
        let cell = self.handle(domain)?;
        let handle = cell.get().expect("index initialized above");
        let k = top_k.unwrap_or(self.config.top_k);

        let searcher = handle.reader.searcher();
        let parser = QueryParser::for_index(&handle.index, vec![handle.content_field, handle.title_field]);
        let parsed = parser.parse_query(query).map_err(|e| Error::Retrieval(e.to_string()))?;
        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(k)).map_err(|e| Error::Retrieval(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address).map_err(|e| Error::Retrieval(e.to_string()))?;
            let content = doc
                .get_first(handle.content_field)
                .and_then(|v| match v {
                    OwnedValue::Str(s) => Some(s.as_str()),
                    _ => None,
                })
                .unwrap_or("")
                .to_string();
            let source = doc.get_first(handle.id_field).and_then(|v| match v {
                OwnedValue::Str(s) => Some(s.as_str()),
                _ => None,
            });
            let title = doc.get_first(handle.title_field).and_then(|v| match v {
                OwnedValue::Str(s) => Some(s.as_str()),
                _ => None,
            });

            let mut document = Document::new(content).with_meta("domain", domain.as_str());
            if let Some(source) = source {
                document = document.with_meta("source", source);
            }
            if let Some(title) = title {
                document = document.with_meta("title", title);
            }
            results.push(Bm25Result { document, score });
        }
        Ok(results)
    }

    pub fn doc_count(&self, domain: Domain) -> Result<u64> {
        let cell = self.handle(domain)?;
        Ok(cell.get().expect("index initialized above").reader.searcher().num_docs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_and_search_korean() {
        let table = Bm25IndexTable::new(Bm25Config::default());
        let docs = vec![
            Document::new("부가세 신고 기한은 매년 1월과 7월입니다").with_meta("title", "부가세 안내"),
            Document::new("근로계약서 작성 시 필수 기재 사항을 안내합니다").with_meta("title", "근로계약"),
        ];
        table.index_documents(Domain::FinanceTax, &docs).unwrap();
        assert_eq!(table.doc_count(Domain::FinanceTax).unwrap(), 2);

        let results = table.search(Domain::FinanceTax, "부가세 신고", None).unwrap();
        assert!(!results.is_empty());
        assert!(results[0].document.content.contains("부가세"));
    }

    #[test]
    fn test_separate_domains_have_separate_indexes() {
        let table = Bm25IndexTable::new(Bm25Config::default());
        table.index_documents(Domain::FinanceTax, &[Document::new("세무 문서")]).unwrap();
        table.index_documents(Domain::HrLabor, &[Document::new("노무 문서")]).unwrap();
        assert_eq!(table.doc_count(Domain::FinanceTax).unwrap(), 1);
        assert_eq!(table.doc_count(Domain::HrLabor).unwrap(), 1);
    }
}
