//! First-stage retrieval.
//!
//! The [`VectorRetriever`] embeds a query and asks the vector index for the
//! `n` most similar passages. Each index call runs under a deadline, and an
//! unavailable index is retried once after a backoff; no other failure is
//! retried.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::index::{IndexError, IndexHit, IndexResult, VectorIndex};
use crate::models::CandidatePassage;

/// Errors that can occur during retrieval.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Empty query or zero candidate count
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Query embedding failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Index unreachable after retrying
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Index call exceeded its deadline
    #[error("Index search timed out after {0:?}")]
    TimedOut(Duration),

    /// Any other index failure
    #[error("Index error: {0}")]
    IndexError(String),
}

/// Result type for retrieval operations.
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Deadline and retry settings for the retriever.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    /// Bound on each index call; `None` waits indefinitely
    pub deadline: Option<Duration>,

    /// Wait before retrying an unavailable index
    pub retry_backoff: Duration,

    /// Retries allowed for an unavailable index
    pub max_retries: u32,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            deadline: Some(Duration::from_secs(30)),
            retry_backoff: Duration::from_millis(500),
            max_retries: 1,
        }
    }
}

/// Embeds queries and fetches candidate passages from a vector index.
pub struct VectorRetriever<E, I>
where
    E: EmbeddingProvider,
    I: VectorIndex,
{
    /// Embedding provider for query embedding
    embedding_provider: E,

    /// Index queried for candidates
    index: I,

    options: RetrievalOptions,
}

impl<E, I> VectorRetriever<E, I>
where
    E: EmbeddingProvider,
    I: VectorIndex,
{
    pub fn new(embedding_provider: E, index: I) -> Self {
        Self::with_options(embedding_provider, index, RetrievalOptions::default())
    }

    pub fn with_options(embedding_provider: E, index: I, options: RetrievalOptions) -> Self {
        Self {
            embedding_provider,
            index,
            options,
        }
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Retrieve up to `n` candidates for `query`, most similar first.
    ///
    /// # Errors
    /// - `InvalidQuery` for a blank query or `n == 0`
    /// - `IndexUnavailable` if the index stays unreachable after retrying
    /// - `TimedOut` if an index call exceeds the deadline
    pub async fn retrieve(&self, query: &str, n: usize) -> RetrievalResult<Vec<CandidatePassage>> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery("query cannot be empty".to_string()));
        }
        if n == 0 {
            return Err(RetrievalError::InvalidQuery(
                "candidate count must be greater than zero".to_string(),
            ));
        }

        let normalized_query = normalize_text(query);
        let query_embedding = self
            .embedding_provider
            .embed(&normalized_query)
            .await
            .map_err(|e| RetrievalError::EmbeddingError(e.to_string()))?;

        let hits = self.search_with_retry(&query_embedding, n).await?;
        debug!(
            index = self.index.name(),
            requested = n,
            returned = hits.len(),
            "retrieved candidates"
        );

        Ok(hits
            .into_iter()
            .take(n)
            .enumerate()
            .map(|(rank, hit)| CandidatePassage {
                text: hit.text,
                metadata: hit.metadata,
                retrieval_rank: rank,
                similarity: hit.similarity,
            })
            .collect())
    }

    async fn search_with_retry(
        &self,
        query_embedding: &[f32],
        n: usize,
    ) -> RetrievalResult<Vec<IndexHit>> {
        let mut attempt = 0;
        loop {
            match self.search_once(query_embedding, n).await? {
                Ok(hits) => return Ok(hits),
                Err(e) if e.is_transient() && attempt < self.options.max_retries => {
                    let backoff = self.options.retry_backoff * 2u32.pow(attempt);
                    attempt += 1;
                    warn!(
                        index = self.index.name(),
                        attempt,
                        ?backoff,
                        error = %e,
                        "index unavailable, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(IndexError::Unavailable(reason)) => return Err(RetrievalError::IndexUnavailable(reason)),
                Err(IndexError::TimedOut(after)) => return Err(RetrievalError::TimedOut(after)),
                Err(other) => return Err(RetrievalError::IndexError(other.to_string())),
            }
        }
    }

    /// One index call under the deadline. The outer error is the deadline
    /// expiring; the inner result is whatever the index returned.
    async fn search_once(
        &self,
        query_embedding: &[f32],
        n: usize,
    ) -> RetrievalResult<IndexResult<Vec<IndexHit>>> {
        let search = self.index.search(query_embedding, n);
        match self.options.deadline {
            Some(deadline) => tokio::time::timeout(deadline, search)
                .await
                .map_err(|_| RetrievalError::TimedOut(deadline)),
            None => Ok(search.await),
        }
    }
}
