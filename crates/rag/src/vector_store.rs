//! Vector Store Façade (component L2)
//!
//! Generalizes the teacher's `VectorStore` (Qdrant-backed dense search) from
//! a single fixed collection into one collection per domain, adds
//! `mmr_search` (the teacher only exposes plain top-k `search`), and wraps
//! every call in the teacher's `OllamaBackend`-style exponential-backoff
//! retry loop since Qdrant I/O is the same kind of transient-failure-prone
//! network call.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, Condition, CreateCollectionBuilder, Distance, FieldCondition, Filter, Match,
    SearchPointsBuilder, UpsertPointsBuilder, PointStruct, VectorParamsBuilder,
};
use qdrant_client::Qdrant;

use sme_rag_core::{Document, Domain, Error, Result};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Connection and collection-naming configuration for the façade.
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub endpoint: String,
    pub vector_dim: usize,
    pub api_key: Option<String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self { endpoint: "http://localhost:6334".to_string(), vector_dim: 1024, api_key: None }
    }
}

/// One collection per domain, `law_common` additionally serving as the
/// shared cross-domain supplementary collection (§4.2).
fn collection_name(domain: Domain) -> String {
    format!("sme_rag_{}", domain.as_str())
}

/// Façade over the dense vector backend.
#[async_trait]
pub trait VectorStoreFacade: Send + Sync {
    async fn similarity_search(
        &self,
        domain: Domain,
        query_embedding: &[f32],
        k: usize,
        filter: Option<MetadataMatch>,
    ) -> Result<Vec<Document>>;

    /// Maximal Marginal Relevance search: fetches `fetch_k` candidates then
    /// greedily selects `k` that trade off relevance against diversity,
    /// weighted by `lambda` (1.0 = pure relevance, 0.0 = pure diversity).
    async fn mmr_search(
        &self,
        domain: Domain,
        query_embedding: &[f32],
        k: usize,
        fetch_k: usize,
        lambda: f32,
    ) -> Result<Vec<Document>>;

    fn get_collection(&self, domain: Domain) -> String;
}

/// A single metadata equality filter (domain restriction, category, etc).
#[derive(Debug, Clone)]
pub struct MetadataMatch {
    pub field: String,
    pub value: String,
}

pub struct QdrantVectorStore {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl QdrantVectorStore {
    pub fn new(config: VectorStoreConfig) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder.build().map_err(|e| Error::Retrieval(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub async fn ensure_collection(&self, domain: Domain) -> Result<()> {
        let name = collection_name(domain);
        let exists = self
            .client
            .collection_exists(&name)
            .await
            .map_err(|e| Error::Retrieval(e.to_string()))?;
        if !exists {
            self.client
                .create_collection(CreateCollectionBuilder::new(&name).vectors_config(
                    VectorParamsBuilder::new(self.config.vector_dim as u64, Distance::Cosine),
                ))
                .await
                .map_err(|e| Error::Retrieval(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn upsert(&self, domain: Domain, documents: &[Document], embeddings: &[Vec<f32>]) -> Result<()> {
        if documents.len() != embeddings.len() {
            return Err(Error::Retrieval("document/embedding count mismatch".to_string()));
        }
        let points: Vec<PointStruct> = documents
            .iter()
            .zip(embeddings.iter())
            .enumerate()
            .map(|(idx, (doc, emb))| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
                payload.insert("content".to_string(), doc.content.clone().into());
                for (k, v) in &doc.metadata {
                    if let Some(s) = v.as_str() {
                        payload.insert(k.clone(), s.to_string().into());
                    }
                }
                PointStruct::new(idx as u64, emb.clone(), payload)
            })
            .collect();

        self.with_retry(|| async {
            self.client
                .upsert_points(UpsertPointsBuilder::new(collection_name(domain), points.clone()))
                .await
                .map_err(|e| Error::Retrieval(e.to_string()))
        })
        .await
    }

    async fn with_retry<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_err = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                tracing::warn!(attempt, ?backoff, "vector store request retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Retrieval("max retries exceeded".to_string())))
    }

    fn build_filter(filter: &Option<MetadataMatch>) -> Option<Filter> {
        filter.as_ref().map(|f| Filter {
            must: vec![Condition {
                condition_one_of: Some(qdrant_client::qdrant::condition::ConditionOneOf::Field(
                    FieldCondition {
                        key: f.field.clone(),
                        r#match: Some(Match {
                            match_value: Some(qdrant_client::qdrant::r#match::MatchValue::Keyword(
                                f.value.clone(),
                            )),
                        }),
                        ..Default::default()
                    },
                )),
            }],
            ..Default::default()
        })
    }

    async fn raw_search(
        &self,
        domain: Domain,
        query_embedding: &[f32],
        top_k: usize,
        filter: Option<MetadataMatch>,
    ) -> Result<Vec<(Document, Vec<f32>)>> {
        let collection = collection_name(domain);
        let qdrant_filter = Self::build_filter(&filter);
        let embedding = query_embedding.to_vec();

        self.with_retry(|| async {
            let mut builder =
                SearchPointsBuilder::new(&collection, embedding.clone(), top_k as u64).with_payload(true).with_vectors(true);
            if let Some(ref f) = qdrant_filter {
                builder = builder.filter(f.clone());
            }
            let response = self
                .client
                .search_points(builder)
                .await
                .map_err(|e| Error::Retrieval(e.to_string()))?;

            Ok(response
                .result
                .into_iter()
                .map(|point| {
                    let mut doc = Document::new(
                        point
                            .payload
                            .get("content")
                            .and_then(|v| match &v.kind {
                                Some(Kind::StringValue(s)) => Some(s.clone()),
                                _ => None,
                            })
                            .unwrap_or_default(),
                    )
                    .with_meta("score", point.score as f64)
                    .with_meta("domain", domain.as_str());
                    for (key, value) in &point.payload {
                        if key == "content" {
                            continue;
                        }
                        if let Some(Kind::StringValue(s)) = &value.kind {
                            doc = doc.with_meta(key.clone(), s.clone());
                        }
                    }
                    let vector = point
                        .vectors
                        .and_then(|v| v.vectors_options)
                        .map(|opts| match opts {
                            qdrant_client::qdrant::vectors::VectorsOptions::Vector(v) => v.data,
                            _ => Vec::new(),
                        })
                        .unwrap_or_default();
                    (doc, vector)
                })
                .collect())
        })
        .await
    }
}

#[async_trait]
impl VectorStoreFacade for QdrantVectorStore {
    async fn similarity_search(
        &self,
        domain: Domain,
        query_embedding: &[f32],
        k: usize,
        filter: Option<MetadataMatch>,
    ) -> Result<Vec<Document>> {
        Ok(self
            .raw_search(domain, query_embedding, k, filter)
            .await?
            .into_iter()
            .map(|(doc, _)| doc)
            .collect())
    }

    async fn mmr_search(
        &self,
        domain: Domain,
        query_embedding: &[f32],
        k: usize,
        fetch_k: usize,
        lambda: f32,
    ) -> Result<Vec<Document>> {
        let candidates = self.raw_search(domain, query_embedding, fetch_k.max(k), None).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        Ok(mmr_select(query_embedding, candidates, k, lambda))
    }

    fn get_collection(&self, domain: Domain) -> String {
        collection_name(domain)
    }
}

/// Greedy MMR selection: repeatedly pick the candidate maximizing
/// `lambda * relevance - (1 - lambda) * max_similarity_to_selected`.
fn mmr_select(query_embedding: &[f32], candidates: Vec<(Document, Vec<f32>)>, k: usize, lambda: f32) -> Vec<Document> {
    let mut pool = candidates;
    let mut selected: Vec<(Document, Vec<f32>)> = Vec::with_capacity(k.min(pool.len()));

    while selected.len() < k && !pool.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::MIN;
        for (idx, (_, vector)) in pool.iter().enumerate() {
            let relevance = cosine_similarity(query_embedding, vector);
            let redundancy = selected
                .iter()
                .map(|(_, sv)| cosine_similarity(vector, sv))
                .fold(0.0f32, f32::max);
            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }
        selected.push(pool.remove(best_idx));
    }

    selected.into_iter().map(|(doc, _)| doc).collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_per_domain() {
        assert_eq!(collection_name(Domain::FinanceTax), "sme_rag_finance_tax");
        assert_eq!(collection_name(Domain::LawCommon), "sme_rag_law_common");
    }

    #[test]
    fn test_cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mmr_select_diversifies_against_near_duplicates() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            (Document::new("a"), vec![1.0, 0.0]),
            (Document::new("b"), vec![0.99, 0.01]),
            (Document::new("c"), vec![0.0, 1.0]),
        ];
        let selected = mmr_select(&query, candidates, 2, 0.5);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].content, "a");
        assert_eq!(selected[1].content, "c");
    }
}
