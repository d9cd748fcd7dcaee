//! Re-ranking of retrieved candidates.

use std::time::Duration;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use crate::document::{Document, RERANK_SCORE_KEY};
use crate::error::{AgentError, AgentResult};

/// Number of documents kept for generation after re-ranking.
pub const FINAL_DOCS_COUNT: usize = 3;

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns `docs` ordered by relevance to `query`, each annotated with a
    /// `rerank_score` metadata entry.
    async fn rerank(&self, query: &str, docs: Vec<Document>) -> AgentResult<Vec<Document>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            model: "BAAI/bge-reranker-v2-m3".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: Option<usize>,
    relevance_score: f64,
}

/// Client for a cross-encoder rerank endpoint (`{model, query, documents}`).
pub struct HttpReranker {
    client: reqwest::Client,
    config: RerankConfig,
}

impl HttpReranker {
    pub fn new(config: RerankConfig) -> AgentResult<Self> {
        if config.endpoint.is_empty() {
            return Err(AgentError::Configuration(
                "rerank endpoint must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, mut docs: Vec<Document>) -> AgentResult<Vec<Document>> {
        if docs.is_empty() {
            return Ok(docs);
        }
        let request = RerankRequest {
            model: &self.config.model,
            query,
            documents: docs.iter().map(|doc| doc.page_content.as_str()).collect(),
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(AgentError::HttpStatus {
                service: "rerank",
                status,
                body,
            });
        }

        let parsed: RerankResponse = response.json().await?;
        for (position, result) in parsed.results.iter().enumerate() {
            let idx = result.index.unwrap_or(position);
            let Some(doc) = docs.get_mut(idx) else {
                return Err(AgentError::ResponseFormat(format!(
                    "rerank result index {idx} out of range for {} documents",
                    docs.len()
                )));
            };
            doc.metadata
                .insert(RERANK_SCORE_KEY.to_string(), result.relevance_score.into());
        }

        sort_by_score(&mut docs);
        Ok(docs)
    }
}

/// Orders documents by `rerank_score`, highest first. Unscored documents sink.
pub fn sort_by_score(docs: &mut [Document]) {
    docs.sort_by(|a, b| {
        let a = a.rerank_score().unwrap_or(f64::NEG_INFINITY);
        let b = b.rerank_score().unwrap_or(f64::NEG_INFINITY);
        b.total_cmp(&a)
    });
}

/// Keeps the best `keep` documents and logs the final selection.
pub fn select_top(query: &str, mut docs: Vec<Document>, keep: usize) -> Vec<Document> {
    docs.truncate(keep);
    let listing: Vec<String> = docs
        .iter()
        .enumerate()
        .map(|(idx, doc)| match doc.rerank_score() {
            Some(score) => format!("\t\t{}. {}\t(score: {:.4})", idx + 1, doc.name(), score),
            None => format!("\t\t{}. {}\t(score: N/A)", idx + 1, doc.name()),
        })
        .collect();
    info!(
        "Reranked documents for query - \"{}\": \n{}",
        query,
        listing.join("\n")
    );
    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn docs() -> Vec<Document> {
        vec![
            Document::new("a", "bronze bell"),
            Document::new("b", "ming vase"),
            Document::new("c", "trade map"),
        ]
    }

    #[tokio::test]
    async fn http_reranker_orders_by_score() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rerank")
                    .header("authorization", "Bearer key");
                then.status(200).json_body(json!({
                    "results": [
                        {"index": 1, "relevance_score": 0.91},
                        {"index": 2, "relevance_score": 0.40},
                        {"index": 0, "relevance_score": 0.05}
                    ]
                }));
            })
            .await;

        let reranker = HttpReranker::new(RerankConfig {
            endpoint: server.url("/rerank"),
            api_key: "key".to_string(),
            ..RerankConfig::default()
        })
        .unwrap();
        let ranked = reranker.rerank("vase", docs()).await.unwrap();

        mock.assert_async().await;
        let ids: Vec<_> = ranked.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(ranked[0].rerank_score(), Some(0.91));
    }

    #[tokio::test]
    async fn http_reranker_surfaces_api_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rerank");
                then.status(401).body("bad key");
            })
            .await;

        let reranker = HttpReranker::new(RerankConfig {
            endpoint: server.url("/rerank"),
            ..RerankConfig::default()
        })
        .unwrap();
        assert!(matches!(
            reranker.rerank("vase", docs()).await,
            Err(AgentError::HttpStatus { status: 401, .. })
        ));
    }

    #[test]
    fn select_top_truncates() {
        let mut scored = docs();
        for (doc, score) in scored.iter_mut().zip([0.1, 0.9, 0.5]) {
            doc.metadata.insert(RERANK_SCORE_KEY.to_string(), score.into());
        }
        sort_by_score(&mut scored);
        let top = select_top("q", scored, 2);
        assert_eq!(top.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
    }
}
