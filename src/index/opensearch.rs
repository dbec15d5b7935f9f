//! OpenSearch k-NN index implementation.
//!
//! Documents use the same layout as the LangChain OpenSearch vector store:
//! `text`, `metadata`, and a `knn_vector` field named `vector_field`. The
//! embedding configuration lives in the mapping's `_meta` block.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{EmbeddingConfig, IndexError, IndexHit, IndexResult, IndexedPassage, VectorIndex};
use crate::models::PassageMetadata;

/// Default OpenSearch endpoint.
pub const DEFAULT_URL: &str = "http://localhost:9200";

/// Default index name.
pub const DEFAULT_INDEX: &str = "research-papers";

const VECTOR_FIELD: &str = "vector_field";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_score", default)]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Debug, Deserialize)]
struct HitSource {
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: PassageMetadata,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: usize,
}

/// OpenSearch-backed vector index.
pub struct OpenSearchIndex {
    client: Client,
    base_url: String,
    index_name: String,
    request_timeout: Duration,
}

impl OpenSearchIndex {
    /// Create a client for `index_name` at `base_url`.
    ///
    /// `request_timeout` bounds each HTTP request at the transport level.
    pub fn new(
        base_url: impl Into<String>,
        index_name: impl Into<String>,
        request_timeout: Duration,
    ) -> IndexResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| IndexError::Backend(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index_name: index_name.into(),
            request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.base_url, self.index_name, path)
    }

    /// Translate a response status into an error, if it is one.
    async fn check_status(response: reqwest::Response) -> IndexResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::status_error(status, &body))
    }

    fn status_error(status: StatusCode, body: &str) -> IndexError {
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            IndexError::Unavailable(format!("OpenSearch returned {}: {}", status, body))
        } else {
            IndexError::Backend(format!("OpenSearch returned {}: {}", status, body))
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> IndexError {
        if e.is_timeout() {
            IndexError::TimedOut(self.request_timeout)
        } else if e.is_connect() || e.is_request() {
            IndexError::Unavailable(e.to_string())
        } else {
            IndexError::Backend(e.to_string())
        }
    }

    /// Build the k-NN query body.
    fn search_body(query_embedding: &[f32], n: usize) -> Value {
        json!({
            "size": n,
            "query": {
                "knn": {
                    VECTOR_FIELD: {
                        "vector": query_embedding,
                        "k": n
                    }
                }
            },
            "_source": { "excludes": [VECTOR_FIELD] }
        })
    }

    /// Build the index creation body with the k-NN mapping.
    fn create_body(config: &EmbeddingConfig) -> Value {
        json!({
            "settings": { "index": { "knn": true } },
            "mappings": {
                "_meta": {
                    "embedding_model": config.model_name,
                    "dimension": config.dimension
                },
                "properties": {
                    VECTOR_FIELD: { "type": "knn_vector", "dimension": config.dimension },
                    "text": { "type": "text" }
                }
            }
        })
    }

    /// Build the newline-delimited `_bulk` payload.
    fn bulk_body(&self, passages: &[IndexedPassage]) -> IndexResult<String> {
        let mut body = String::new();
        for passage in passages {
            let action = json!({ "index": { "_index": self.index_name } });
            let doc = json!({
                "text": passage.text,
                "metadata": passage.metadata,
                VECTOR_FIELD: passage.embedding,
            });
            for line in [action, doc] {
                let encoded = serde_json::to_string(&line)
                    .map_err(|e| IndexError::SerializationError(e.to_string()))?;
                body.push_str(&encoded);
                body.push('\n');
            }
        }
        Ok(body)
    }

    fn parse_hits(response: SearchResponse) -> Vec<IndexHit> {
        response
            .hits
            .hits
            .into_iter()
            .map(|hit| IndexHit {
                text: hit.source.text,
                metadata: hit.source.metadata,
                similarity: hit.score.unwrap_or(0.0),
            })
            .collect()
    }

    /// Read the embedding configuration out of a `_mapping` response.
    fn parse_config(mapping: &Value, index_name: &str) -> Option<EmbeddingConfig> {
        let meta = mapping.get(index_name)?.get("mappings")?.get("_meta")?;
        Some(EmbeddingConfig {
            model_name: meta.get("embedding_model")?.as_str()?.to_string(),
            dimension: meta.get("dimension")?.as_u64()? as usize,
        })
    }
}

#[async_trait]
impl VectorIndex for OpenSearchIndex {
    async fn initialize(&self, config: &EmbeddingConfig) -> IndexResult<()> {
        let exists = self
            .client
            .head(self.url(""))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match exists.status() {
            StatusCode::OK => {
                debug!(index = %self.index_name, "index already exists");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                let response = self
                    .client
                    .put(self.url(""))
                    .json(&Self::create_body(config))
                    .send()
                    .await
                    .map_err(|e| self.transport_error(e))?;
                Self::check_status(response).await?;
                info!(index = %self.index_name, dimension = config.dimension, "created index");
                Ok(())
            }
            status => Err(Self::status_error(status, "")),
        }
    }

    async fn get_config(&self) -> IndexResult<Option<EmbeddingConfig>> {
        let response = self
            .client
            .get(self.url("/_mapping"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let mapping: Value = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexError::SerializationError(e.to_string()))?;

        Ok(Self::parse_config(&mapping, &self.index_name))
    }

    async fn add_passages(&self, passages: &[IndexedPassage]) -> IndexResult<usize> {
        if passages.is_empty() {
            return Ok(0);
        }

        let response = self
            .client
            .post(format!("{}/_bulk?refresh=true", self.base_url))
            .header("Content-Type", "application/x-ndjson")
            .body(self.bulk_body(passages)?)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let result: Value = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexError::SerializationError(e.to_string()))?;

        if result.get("errors").and_then(Value::as_bool).unwrap_or(false) {
            warn!(index = %self.index_name, "bulk insert reported item errors");
            return Err(IndexError::Backend(
                "Bulk insert reported errors for one or more passages".to_string(),
            ));
        }

        Ok(passages.len())
    }

    async fn search(&self, query_embedding: &[f32], n: usize) -> IndexResult<Vec<IndexHit>> {
        if n == 0 {
            return Err(IndexError::InvalidRequest("n must be greater than zero".to_string()));
        }

        let response = self
            .client
            .post(self.url("/_search"))
            .json(&Self::search_body(query_embedding, n))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let parsed: SearchResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexError::SerializationError(e.to_string()))?;

        let mut hits = Self::parse_hits(parsed);
        hits.truncate(n);
        Ok(hits)
    }

    async fn count(&self) -> IndexResult<usize> {
        let response = self
            .client
            .get(self.url("/_count"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let parsed: CountResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexError::SerializationError(e.to_string()))?;

        Ok(parsed.count)
    }

    fn name(&self) -> &str {
        "opensearch"
    }
}
