//! Retrieval of candidate documents for a query.
//!
//! The hosted services do the ranking: OpenAI embeds the query, Pinecone
//! returns nearest neighbours per namespace, and Pinecone's reranker orders the
//! merged candidates. This module wires those calls together and applies the
//! relevance cut-off.

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::citations::SourceDocument;
use crate::config::RetrievalConfig;
use crate::error::{ChatError, Result};

const PINECONE_API_VERSION: &str = "2025-01";

/// A source of candidate documents for a user query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return relevant documents, best first.
    async fn retrieve(&self, query: &str) -> Result<Vec<SourceDocument>>;
}

/// Retriever used when retrieval is disabled or unconfigured.
pub struct NoRetrieval;

#[async_trait]
impl Retriever for NoRetrieval {
    async fn retrieve(&self, _query: &str) -> Result<Vec<SourceDocument>> {
        Ok(Vec::new())
    }
}

// ============ Wire types ============

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Serialize)]
struct RerankDocument<'a> {
    id: &'a str,
    text: String,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    #[serde(default)]
    data: Vec<RerankResult>,
}

/// One reranked item as returned by the rerank endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RerankResult {
    /// Position in the submitted document list.
    #[serde(default)]
    pub index: Option<usize>,
    pub score: f64,
    #[serde(default)]
    pub document: Option<RerankedDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RerankedDocument {
    #[serde(default)]
    pub id: Option<String>,
}

// ============ Pinecone retriever ============

/// OpenAI embeddings + Pinecone vector query + Pinecone rerank.
pub struct PineconeRetriever {
    client: reqwest::Client,
    config: RetrievalConfig,
    openai_key: String,
    pinecone_key: String,
    /// `{index_url}/query`, resolved once from `index_host`.
    query_url: String,
}

impl PineconeRetriever {
    pub fn from_config(config: &RetrievalConfig, client: reqwest::Client) -> Result<Self> {
        let openai_key = read_key(&config.openai_api_key_env)?;
        let pinecone_key = read_key(&config.pinecone_api_key_env)?;
        Ok(Self::new(config, openai_key, pinecone_key, client))
    }

    pub fn new(
        config: &RetrievalConfig,
        openai_key: String,
        pinecone_key: String,
        client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            query_url: format!("{}/query", index_url(&config.index_host)),
            config: config.clone(),
            openai_key,
            pinecone_key,
        }
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>> {
        let body = json!({ "model": self.config.embedding_model, "input": query });
        let response: EmbeddingResponse = self
            .post_json("openai", &self.config.embedding_url, &body, |req| {
                req.bearer_auth(&self.openai_key)
            })
            .await?;
        response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| ChatError::invalid("openai", "empty embedding response"))
    }

    async fn query_namespace(
        &self,
        embedding: &[f32],
        namespace: &str,
    ) -> Result<Vec<SourceDocument>> {
        let body = json!({
            "namespace": namespace,
            "vector": embedding,
            "topK": self.config.top_k,
            "includeMetadata": true,
        });
        let response: QueryResponse = self
            .post_json("pinecone", &self.query_url, &body, |req| self.pinecone_headers(req))
            .await?;

        tracing::debug!(
            namespace,
            matches = response.matches.len(),
            "pinecone query returned"
        );

        Ok(response
            .matches
            .into_iter()
            .map(|m| SourceDocument {
                id: m.id,
                score: m.score,
                rerank_score: None,
                namespace: namespace.to_string(),
                metadata: m.metadata.unwrap_or_default(),
            })
            .collect())
    }

    /// Rerank `documents`; on any failure fall back to vector order.
    async fn rerank(&self, query: &str, documents: Vec<SourceDocument>) -> Vec<SourceDocument> {
        let submitted: Vec<(usize, String)> = documents
            .iter()
            .enumerate()
            .map(|(idx, doc)| (idx, doc.text()))
            .filter(|(_, text)| !text.trim().is_empty())
            .collect();

        if submitted.is_empty() {
            tracing::warn!("no documents with text to rerank");
            return top_by_vector(documents, self.config.top_n);
        }

        let body = {
            let payload: Vec<RerankDocument<'_>> = submitted
                .iter()
                .map(|(idx, text)| RerankDocument {
                    id: documents[*idx].id.as_str(),
                    text: text.clone(),
                })
                .collect();
            json!({
                "model": self.config.rerank_model,
                "query": query,
                "documents": payload,
                "top_n": self.config.top_n,
                "return_documents": false,
            })
        };

        tracing::debug!(count = submitted.len(), "reranking documents");

        let response: Result<RerankResponse> = self
            .post_json("pinecone-rerank", &self.config.rerank_url, &body, |req| {
                self.pinecone_headers(req)
            })
            .await;

        match response {
            Ok(response) => {
                let positions: Vec<usize> = submitted.iter().map(|(idx, _)| *idx).collect();
                apply_rerank(documents, &positions, &response.data, self.config.top_n)
            }
            Err(e) => {
                tracing::warn!(error = %e, "reranking failed, using vector order");
                top_by_vector(documents, self.config.top_n)
            }
        }
    }

    fn pinecone_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Api-Key", &self.pinecone_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
    }

    async fn post_json<T, F>(&self, service: &str, url: &str, body: &Value, auth: F) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
        F: FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    {
        let response = auth(self.client.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::http(service, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                service: service.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ChatError::invalid(service, e.to_string()))
    }
}

#[async_trait]
impl Retriever for PineconeRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<SourceDocument>> {
        if self.config.namespaces.is_empty() || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embed(query).await?;
        let per_namespace = try_join_all(
            self.config
                .namespaces
                .iter()
                .map(|ns| self.query_namespace(&embedding, ns)),
        )
        .await?;

        let candidates = merge_by_score(per_namespace);
        tracing::info!(
            candidates = candidates.len(),
            namespaces = self.config.namespaces.len(),
            "retrieved candidate documents"
        );
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let reranked = self.rerank(query, candidates).await;
        Ok(filter_by_relevance(
            reranked,
            self.config.min_rerank_score,
            self.config.fallback_count,
        ))
    }
}

/// Base URL of a Pinecone index. The console shows bare hosts, so `https://`
/// is assumed when no scheme is given.
pub fn index_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn read_key(var: &str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| ChatError::MissingApiKey(var.to_string()))
}

/// Build the retriever from config, or [`NoRetrieval`] when it cannot run.
pub fn build_retriever(config: &RetrievalConfig) -> anyhow::Result<Arc<dyn Retriever>> {
    if !config.enabled {
        tracing::info!("retrieval disabled");
        return Ok(Arc::new(NoRetrieval));
    }
    if config.index_host.is_empty() {
        tracing::warn!("retrieval.index_host not set, answering without retrieval");
        return Ok(Arc::new(NoRetrieval));
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(20))
        .build()?;
    match PineconeRetriever::from_config(config, client) {
        Ok(retriever) => {
            tracing::info!(index = %config.index_host, "retrieval ready");
            Ok(Arc::new(retriever))
        }
        Err(e) => {
            tracing::warn!(error = %e, "retrieval unavailable, answering without retrieval");
            Ok(Arc::new(NoRetrieval))
        }
    }
}

// ============ Ranking helpers ============

/// Flatten per-namespace results and sort by vector score, best first.
pub fn merge_by_score(per_namespace: Vec<Vec<SourceDocument>>) -> Vec<SourceDocument> {
    let mut all: Vec<SourceDocument> = per_namespace.into_iter().flatten().collect();
    all.sort_by(|a, b| b.score.total_cmp(&a.score));
    all
}

/// First `n` documents with their vector score standing in as rerank score.
pub fn top_by_vector(documents: Vec<SourceDocument>, n: usize) -> Vec<SourceDocument> {
    documents
        .into_iter()
        .take(n)
        .map(|mut doc| {
            doc.rerank_score = Some(doc.score);
            doc
        })
        .collect()
}

/// Map rerank results back onto the original documents.
///
/// `positions[i]` is the index in `documents` of the i-th submitted item.
/// Results are resolved by `index` first, then by document id. If nothing can
/// be resolved the top `top_n` documents by vector score are returned.
pub fn apply_rerank(
    documents: Vec<SourceDocument>,
    positions: &[usize],
    results: &[RerankResult],
    top_n: usize,
) -> Vec<SourceDocument> {
    let reranked: Vec<SourceDocument> = results
        .iter()
        .filter_map(|result| {
            let original = match result.index {
                Some(i) => positions.get(i).copied(),
                None => result
                    .document
                    .as_ref()
                    .and_then(|d| d.id.as_deref())
                    .and_then(|id| documents.iter().position(|doc| doc.id == id)),
            }?;
            let mut doc = documents.get(original)?.clone();
            doc.rerank_score = Some(result.score);
            Some(doc)
        })
        .collect();

    if reranked.is_empty() {
        return top_by_vector(documents, top_n);
    }
    reranked
}

/// Keep documents scoring at least `min_score`.
///
/// If none qualify, keep the best `fallback_count` by rerank score instead.
pub fn filter_by_relevance(
    documents: Vec<SourceDocument>,
    min_score: f64,
    fallback_count: usize,
) -> Vec<SourceDocument> {
    if documents.is_empty() {
        return documents;
    }

    let passing: Vec<SourceDocument> = documents
        .iter()
        .filter(|doc| doc.relevance() >= min_score)
        .cloned()
        .collect();
    if !passing.is_empty() {
        return passing;
    }

    tracing::warn!(
        min_score,
        fallback_count,
        "no documents met the rerank threshold, keeping the top results"
    );
    let mut sorted = documents;
    sorted.sort_by(|a, b| b.relevance().total_cmp(&a.relevance()));
    sorted.truncate(fallback_count);
    sorted
}
