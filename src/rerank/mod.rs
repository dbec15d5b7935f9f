//! Cross-encoder reranking.
//!
//! The second retrieval stage. A [`CrossEncoder`] scores each (query,
//! passage) pair jointly; the [`Reranker`] orders passages by that score and
//! keeps the best `k`.
//!
//! Ordering rules:
//! - scores sort descending
//! - equal scores keep their input (retrieval) order
//! - a passage the model fails to score gets [`SENTINEL_SCORE`] and sinks
//!   below every real score instead of aborting the batch

pub mod fastembed;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Score given to passages the model could not score.
pub const SENTINEL_SCORE: f32 = f32::MIN;

/// Errors that can occur during reranking.
#[derive(Debug, Error)]
pub enum RerankError {
    /// Model failed to produce a score for the given input
    #[error("Model scoring failed: {0}")]
    ModelScoringFailure(String),

    /// Model could not be loaded
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// Scoring did not finish before the deadline
    #[error("Reranking timed out after {0:?}")]
    TimedOut(Duration),
}

/// Result type for reranking operations.
pub type RerankResult<T> = Result<T, RerankError>;

/// Pairwise relevance model.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Score every passage against `query`.
    ///
    /// # Returns
    /// One score per passage, in input order. Higher is more relevant; the
    /// range depends on the model.
    async fn score(&self, query: &str, passages: &[&str]) -> RerankResult<Vec<f32>>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}

/// A reranked passage: its position in the input and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredIndex {
    pub index: usize,
    pub score: f32,
}

/// Orders candidates with a cross-encoder.
pub struct Reranker<C: CrossEncoder> {
    encoder: C,
    deadline: Option<Duration>,
}

impl<C: CrossEncoder> Reranker<C> {
    /// Create a reranker with no deadline.
    pub fn new(encoder: C) -> Self {
        Self {
            encoder,
            deadline: None,
        }
    }

    /// Bound the whole scoring step by `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn encoder(&self) -> &C {
        &self.encoder
    }

    /// Return the top `k` passages by relevance, best first.
    ///
    /// `k` larger than the number of passages returns all of them, sorted.
    /// Empty passage text is scored as-is.
    ///
    /// # Errors
    /// Returns `RerankError::TimedOut` if scoring exceeds the deadline.
    /// Per-passage scoring failures do not error; see [`SENTINEL_SCORE`].
    pub async fn rerank(
        &self,
        query: &str,
        passages: &[&str],
        k: usize,
    ) -> RerankResult<Vec<ScoredIndex>> {
        if passages.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let scores = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.score_all(query, passages))
                .await
                .map_err(|_| RerankError::TimedOut(deadline))?,
            None => self.score_all(query, passages).await,
        };

        Ok(rank_scores(&scores, k))
    }

    /// Score the batch; on batch failure, fall back to one call per passage.
    async fn score_all(&self, query: &str, passages: &[&str]) -> Vec<f32> {
        match self.encoder.score(query, passages).await {
            Ok(scores) if scores.len() == passages.len() => {
                return scores.into_iter().map(sanitize).collect();
            }
            Ok(scores) => warn!(
                expected = passages.len(),
                got = scores.len(),
                model = self.encoder.model_name(),
                "cross-encoder returned wrong number of scores, scoring individually"
            ),
            Err(e) => warn!(
                error = %e,
                model = self.encoder.model_name(),
                "batch scoring failed, scoring individually"
            ),
        }

        let mut scores = Vec::with_capacity(passages.len());
        for (i, passage) in passages.iter().enumerate() {
            let score = match self.encoder.score(query, std::slice::from_ref(passage)).await {
                Ok(single) if single.len() == 1 => sanitize(single[0]),
                Ok(_) => SENTINEL_SCORE,
                Err(e) => {
                    debug!(index = i, error = %e, "dropping passage to sentinel score");
                    SENTINEL_SCORE
                }
            };
            scores.push(score);
        }
        scores
    }
}

fn sanitize(score: f32) -> f32 {
    if score.is_finite() {
        score
    } else {
        SENTINEL_SCORE
    }
}

/// Sort scores descending, keeping input order among equal scores, and keep
/// the first `k`.
pub fn rank_scores(scores: &[f32], k: usize) -> Vec<ScoredIndex> {
    let mut ranked: Vec<ScoredIndex> = scores
        .iter()
        .enumerate()
        .map(|(index, &score)| ScoredIndex { index, score })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(k);
    ranked
}
