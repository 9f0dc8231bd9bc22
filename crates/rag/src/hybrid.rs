//! Hybrid Searcher (component L4)
//!
//! Directly generalizes the teacher's `HybridRetriever`: parallel dense
//! (vector MMR) + sparse (BM25) fetch via `tokio::join!`, RRF fusion, and
//! an optional cross-encoder rerank pass. Differences from the teacher:
//! fetch width is `3k` per spec §4.4 rather than a fixed `dense_top_k`/
//! `sparse_top_k`, fusion weights come from the caller's `SearchStrategy`
//! instead of a single fixed `dense_weight`, and domain-filtered search
//! relaxes to "this domain OR general" when the filtered pool is too thin
//! (the teacher has no domain-partitioned collections to relax across).

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;

use sme_rag_core::{Document, Domain, Error, MetadataFilter, Result, RetrieveOptions, Retriever, SearchStrategy};
use sme_rag_llm::{EmbeddingClient, RerankClient};

use crate::bm25::Bm25IndexTable;
use crate::vector_store::{MetadataMatch, VectorStoreFacade};

/// Default RRF smoothing constant (§4.4: `k_rrf=60`).
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Cross-encoder rerank pool multiplier (§4.4: `m=4`).
pub const RERANK_POOL_MULTIPLIER: usize = 4;

/// Candidate fetch multiplier relative to the requested `k` (§4.4: `3k`).
pub const FETCH_MULTIPLIER: usize = 3;

#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    pub rrf_k: f32,
    pub enable_reranking: bool,
    pub mmr_lambda: f32,
    pub min_domain_k: usize,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self { rrf_k: DEFAULT_RRF_K, enable_reranking: true, mmr_lambda: 0.5, min_domain_k: 2 }
    }
}

struct RankedCandidate {
    document: Document,
    dense_rank: Option<usize>,
    sparse_rank: Option<usize>,
    fused_score: f32,
}

pub struct HybridSearcher {
    vector_store: Arc<dyn VectorStoreFacade>,
    bm25_index: Arc<Bm25IndexTable>,
    embedder: Arc<dyn EmbeddingClient>,
    reranker: Option<Arc<dyn RerankClient>>,
    config: HybridSearchConfig,
}

impl HybridSearcher {
    pub fn new(
        vector_store: Arc<dyn VectorStoreFacade>,
        bm25_index: Arc<Bm25IndexTable>,
        embedder: Arc<dyn EmbeddingClient>,
        config: HybridSearchConfig,
    ) -> Self {
        Self { vector_store, bm25_index, embedder, reranker: None, config }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn RerankClient>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Full hybrid search for one `(query, domain, k)` under the given
    /// adaptive strategy (§4.4 steps 1-4).
    pub async fn search(
        &self,
        query: &str,
        domain: Domain,
        k: usize,
        strategy: SearchStrategy,
        enable_rerank: bool,
    ) -> Result<Vec<Document>> {
        let (dense_weight, sparse_weight) = strategy.weights();
        let fetch_k = k * FETCH_MULTIPLIER;

        let dense_future = self.search_dense(query, domain, fetch_k);
        let sparse_future = self.search_sparse(query, domain, fetch_k);
        let (dense_results, sparse_results) = tokio::join!(dense_future, sparse_future);

        let mut dense_results = dense_results?;
        let mut sparse_results = sparse_results?;

        if dense_results.len() < self.config.min_domain_k || sparse_results.len() < self.config.min_domain_k {
            let (relaxed_dense, relaxed_sparse) = self.search_general_fallback(query, fetch_k).await?;
            dense_results.extend(relaxed_dense);
            sparse_results.extend(relaxed_sparse);
        }

        let mut fused = self.rrf_fuse(dense_results, sparse_results, dense_weight, sparse_weight);

        let reranked = if enable_rerank && self.config.enable_reranking {
            if let Some(ref reranker) = self.reranker {
                let pool_size = (k * RERANK_POOL_MULTIPLIER).min(fused.len());
                self.rerank(reranker.as_ref(), query, fused.drain(..pool_size).collect()).await?
            } else {
                fused
            }
        } else {
            fused
        };

        let mut results: Vec<Document> = reranked.into_iter().take(k).collect();
        stable_break_ties(&mut results);
        Ok(results)
    }

    async fn search_dense(&self, query: &str, domain: Domain, fetch_k: usize) -> Result<Vec<RankedCandidate>> {
        let embedding = self.embedder.embed(query).await.map_err(|e| Error::Retrieval(e.to_string()))?;
        let documents = self
            .vector_store
            .mmr_search(domain, &embedding, fetch_k, fetch_k, self.config.mmr_lambda)
            .await?;
        Ok(documents
            .into_iter()
            .enumerate()
            .map(|(rank, document)| RankedCandidate { document, dense_rank: Some(rank), sparse_rank: None, fused_score: 0.0 })
            .collect())
    }

    async fn search_sparse(&self, query: &str, domain: Domain, fetch_k: usize) -> Result<Vec<RankedCandidate>> {
        let bm25 = Arc::clone(&self.bm25_index);
        let query = query.to_string();
        let results = tokio::task::spawn_blocking(move || bm25.search(domain, &query, Some(fetch_k)))
            .await
            .map_err(|e| Error::Retrieval(format!("bm25 search task failed: {e}")))??;
        Ok(results
            .into_iter()
            .enumerate()
            .map(|(rank, r)| RankedCandidate { document: r.document, dense_rank: None, sparse_rank: Some(rank), fused_score: 0.0 })
            .collect())
    }

    /// Relax the domain filter to `general` when the per-domain pool is too
    /// thin to meet `min_domain_k` (§4.4 step 4).
    async fn search_general_fallback(&self, query: &str, fetch_k: usize) -> Result<(Vec<RankedCandidate>, Vec<RankedCandidate>)> {
        let dense = self.search_dense(query, Domain::General, fetch_k).await.unwrap_or_default();
        let sparse = self.search_sparse(query, Domain::General, fetch_k).await.unwrap_or_default();
        Ok((dense, sparse))
    }

    fn rrf_fuse(
        &self,
        dense: Vec<RankedCandidate>,
        sparse: Vec<RankedCandidate>,
        dense_weight: f32,
        sparse_weight: f32,
    ) -> Vec<Document> {
        let mut by_key: std::collections::HashMap<u64, (Document, f32, Option<usize>)> = std::collections::HashMap::new();

        for candidate in dense {
            let key = candidate.document.dedup_key();
            let rrf = 1.0 / (self.config.rrf_k + candidate.dense_rank.unwrap_or(0) as f32 + 1.0);
            let contribution = rrf * dense_weight;
            by_key
                .entry(key)
                .and_modify(|(_, score, rank)| {
                    *score += contribution;
                    *rank = rank.or(candidate.dense_rank);
                })
                .or_insert((candidate.document, contribution, candidate.dense_rank));
        }

        for candidate in sparse {
            let key = candidate.document.dedup_key();
            let rrf = 1.0 / (self.config.rrf_k + candidate.sparse_rank.unwrap_or(0) as f32 + 1.0);
            let contribution = rrf * sparse_weight;
            by_key
                .entry(key)
                .and_modify(|(_, score, _)| *score += contribution)
                .or_insert((candidate.document, contribution, candidate.sparse_rank));
        }

        let mut fused: Vec<(Document, f32, Option<usize>)> = by_key.into_values().collect();
        fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        fused
            .into_iter()
            .map(|(mut doc, score, dense_rank)| {
                doc = doc.with_meta("fused_score", score as f64);
                if let Some(rank) = dense_rank {
                    doc = doc.with_meta("dense_rank", rank as i64);
                }
                doc
            })
            .collect()
    }

    async fn rerank(&self, reranker: &dyn RerankClient, query: &str, documents: Vec<Document>) -> Result<Vec<Document>> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let scores = reranker.score(query, &texts).await?;
        let mut scored: Vec<(Document, f32)> = documents.into_iter().zip(scores).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        Ok(scored.into_iter().map(|(doc, score)| doc.with_meta("rerank_score", score as f64)).collect())
    }
}

/// Stable tie-break: lower vector rank first, then lexicographic source URI
/// (§4.4 "Ordering guarantee").
fn stable_break_ties(documents: &mut [Document]) {
    documents.sort_by(|a, b| match dense_rank_of(a).cmp(&dense_rank_of(b)) {
        Ordering::Equal => a.source().unwrap_or("").cmp(b.source().unwrap_or("")),
        other => other,
    });
}

fn dense_rank_of(doc: &Document) -> i64 {
    doc.metadata
        .get("dense_rank")
        .and_then(|v| match v {
            sme_rag_core::MetaValue::Int(i) => Some(*i),
            _ => None,
        })
        .unwrap_or(i64::MAX)
}

#[async_trait]
impl Retriever for HybridSearcher {
    async fn retrieve(&self, query: &str, options: &RetrieveOptions) -> Result<Vec<Document>> {
        let domain = domain_from_filters(&options.filters).unwrap_or(Domain::General);
        self.search(query, domain, options.top_k, SearchStrategy::Hybrid, options.rerank).await
    }

    fn name(&self) -> &str {
        "hybrid_searcher"
    }
}

fn domain_from_filters(filters: &[MetadataFilter]) -> Option<Domain> {
    filters.iter().find(|f| f.field == "domain").and_then(|f| f.value.as_str()).and_then(|s| {
        sme_rag_core::EXPERT_DOMAINS.iter().copied().chain([Domain::General]).find(|d| d.as_str() == s)
    })
}
