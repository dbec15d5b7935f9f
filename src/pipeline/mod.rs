//! Retrieve-and-rerank pipeline.
//!
//! Glues the two retrieval stages together: fetch `retrieve_n` candidates
//! from the vector index, rescore them with the cross-encoder, keep the best
//! `keep_k`, and turn the survivors into [`PaperRecord`]s.
//!
//! ```rust,no_run
//! use paper_rag::embedding::fastembed::FastEmbedProvider;
//! use paper_rag::index::memory::InMemoryIndex;
//! use paper_rag::pipeline::RetrievePipeline;
//! use paper_rag::rerank::fastembed::FastEmbedCrossEncoder;
//! use paper_rag::rerank::Reranker;
//! use paper_rag::retrieval::VectorRetriever;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let index = InMemoryIndex::open("data/index.json").await?;
//! let retriever = VectorRetriever::new(FastEmbedProvider::new(None, None), index);
//! let reranker = Reranker::new(FastEmbedCrossEncoder::new(None, None));
//! let pipeline = RetrievePipeline::new(retriever, reranker, 15, 5);
//!
//! for paper in pipeline.retrieve_and_rerank("graph neural networks").await? {
//!     println!("{}", paper.display_title());
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{DEFAULT_KEEP_K, DEFAULT_RETRIEVE_N};
use crate::embedding::EmbeddingProvider;
use crate::index::VectorIndex;
use crate::models::{CandidatePassage, PaperRecord, RankedPassage};
use crate::rerank::{CrossEncoder, RerankError, Reranker};
use crate::retrieval::{RetrievalError, VectorRetriever};

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Index unreachable after the retry
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Retrieval or scoring exceeded its deadline
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Rerank error: {0}")]
    Rerank(String),
}

impl From<RetrievalError> for PipelineError {
    fn from(e: RetrievalError) -> Self {
        match e {
            RetrievalError::InvalidQuery(msg) => PipelineError::InvalidQuery(msg),
            RetrievalError::IndexUnavailable(msg) => PipelineError::IndexUnavailable(msg),
            RetrievalError::TimedOut(deadline) => PipelineError::TimedOut(deadline),
            other => PipelineError::Retrieval(other.to_string()),
        }
    }
}

impl From<RerankError> for PipelineError {
    fn from(e: RerankError) -> Self {
        match e {
            RerankError::TimedOut(deadline) => PipelineError::TimedOut(deadline),
            other => PipelineError::Rerank(other.to_string()),
        }
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Output of one pipeline run, before conversion to paper records.
#[derive(Debug, Clone)]
pub struct RankedRun {
    /// Everything the index returned, in retrieval order
    pub retrieved: Vec<CandidatePassage>,

    /// Reranked survivors, best first
    pub ranked: Vec<RankedPassage>,
}

impl RankedRun {
    pub fn papers(&self) -> Vec<PaperRecord> {
        self.ranked.iter().map(RankedPassage::to_paper_record).collect()
    }
}

/// Two-stage retrieval: vector search, then cross-encoder reranking.
pub struct RetrievePipeline<E, I, C>
where
    E: EmbeddingProvider,
    I: VectorIndex,
    C: CrossEncoder,
{
    retriever: VectorRetriever<E, I>,
    reranker: Reranker<C>,

    /// Candidates requested from the index (N)
    retrieve_n: usize,

    /// Candidates kept after reranking (K)
    keep_k: usize,
}

impl<E, I, C> RetrievePipeline<E, I, C>
where
    E: EmbeddingProvider,
    I: VectorIndex,
    C: CrossEncoder,
{
    /// Create a pipeline.
    ///
    /// Zero values for `retrieve_n` or `keep_k` fall back to the defaults
    /// (15 and 5).
    pub fn new(
        retriever: VectorRetriever<E, I>,
        reranker: Reranker<C>,
        retrieve_n: usize,
        keep_k: usize,
    ) -> Self {
        Self {
            retriever,
            reranker,
            retrieve_n: if retrieve_n == 0 { DEFAULT_RETRIEVE_N } else { retrieve_n },
            keep_k: if keep_k == 0 { DEFAULT_KEEP_K } else { keep_k },
        }
    }

    pub fn retrieve_n(&self) -> usize {
        self.retrieve_n
    }

    pub fn keep_k(&self) -> usize {
        self.keep_k
    }

    pub fn retriever(&self) -> &VectorRetriever<E, I> {
        &self.retriever
    }

    /// Retrieve and rerank, keeping both stages' output.
    pub async fn rank(&self, query: &str) -> PipelineResult<RankedRun> {
        let retrieved = self.retriever.retrieve(query, self.retrieve_n).await?;
        if retrieved.is_empty() {
            info!(query, "no candidates retrieved");
            return Ok(RankedRun {
                retrieved,
                ranked: Vec::new(),
            });
        }

        let texts: Vec<&str> = retrieved.iter().map(|c| c.text.as_str()).collect();
        let scored = self.reranker.rerank(query, &texts, self.keep_k).await?;

        let ranked: Vec<RankedPassage> = scored
            .into_iter()
            .map(|s| RankedPassage {
                passage: retrieved[s.index].clone(),
                score: s.score,
            })
            .collect();

        debug!(
            retrieved = retrieved.len(),
            kept = ranked.len(),
            top_score = ranked.first().map(|r| r.score),
            "reranked candidates"
        );

        Ok(RankedRun { retrieved, ranked })
    }

    /// Return up to `keep_k` paper records for `query`, most relevant first.
    ///
    /// # Errors
    /// - `InvalidQuery` for a blank query
    /// - `IndexUnavailable` if the index stays unreachable after one retry
    /// - `TimedOut` if retrieval or scoring exceeds its deadline
    pub async fn retrieve_and_rerank(&self, query: &str) -> PipelineResult<Vec<PaperRecord>> {
        Ok(self.rank(query).await?.papers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::InMemoryIndex;
    use crate::index::{IndexedPassage, VectorIndex};
    use crate::models::PassageMetadata;
    use crate::rerank::tests::TableEncoder;
    use crate::retrieval::RetrievalOptions;
    use crate::testing::{MockEmbeddingProvider, ScriptedIndex};

    const TOPICS: [&str; 20] = [
        "graph neural networks for molecules",
        "message passing graph networks",
        "graph attention networks",
        "spectral graph convolution",
        "neural networks on citation graphs",
        "graph pooling layers",
        "inductive representation learning on large graphs",
        "graph transformers",
        "knowledge graph embeddings",
        "temporal graph networks",
        "graph neural network expressivity",
        "scalable graph training",
        "graph autoencoders",
        "heterogeneous graph networks",
        "graph contrastive learning",
        "protein folding",
        "speech recognition",
        "image segmentation",
        "reinforcement learning for games",
        "machine translation",
    ];

    async fn populated_index(embedder: &MockEmbeddingProvider) -> InMemoryIndex {
        let index = InMemoryIndex::new();
        let passages: Vec<IndexedPassage> = TOPICS
            .iter()
            .map(|topic| IndexedPassage {
                text: topic.to_string(),
                metadata: PassageMetadata {
                    title: Some(format!("On {}", topic)),
                    authors: Some("A. Author".to_string()),
                    ..Default::default()
                },
                embedding: embedder.vector(topic),
            })
            .collect();
        index.add_passages(&passages).await.unwrap();
        index
    }

    /// Scores each topic by its position in the table, so results are known.
    fn topic_scores() -> Vec<(&'static str, f32)> {
        TOPICS
            .iter()
            .enumerate()
            .map(|(i, t)| (*t, (i % 7) as f32))
            .collect()
    }

    fn options() -> RetrievalOptions {
        RetrievalOptions {
            deadline: Some(Duration::from_secs(5)),
            retry_backoff: Duration::from_millis(1),
            max_retries: 1,
        }
    }

    async fn graph_pipeline() -> RetrievePipeline<MockEmbeddingProvider, InMemoryIndex, TableEncoder> {
        let embedder = MockEmbeddingProvider::new(16);
        let index = populated_index(&embedder).await;
        let scores = topic_scores();
        RetrievePipeline::new(
            VectorRetriever::with_options(embedder, index, options()),
            Reranker::new(TableEncoder::new(&scores)),
            15,
            5,
        )
    }

    #[tokio::test]
    async fn test_graph_query_returns_top_five_of_fifteen() {
        let pipeline = graph_pipeline().await;
        let run = pipeline.rank("graph neural networks").await.unwrap();

        assert_eq!(run.retrieved.len(), 15);
        assert_eq!(run.ranked.len(), 5);
        for pair in run.ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }

        let papers = run.papers();
        assert_eq!(papers.len(), 5);
        assert!(papers.iter().all(|p| p.title.as_deref().unwrap().starts_with("On ")));
    }

    #[tokio::test]
    async fn test_ranked_is_subset_of_retrieved() {
        let pipeline = graph_pipeline().await;
        let run = pipeline.rank("graph neural networks").await.unwrap();

        for ranked in &run.ranked {
            let original = &run.retrieved[ranked.passage.retrieval_rank];
            assert_eq!(original, &ranked.passage);
        }
    }

    #[tokio::test]
    async fn test_same_query_same_output() {
        let pipeline = graph_pipeline().await;
        let first = pipeline.retrieve_and_rerank("graph neural networks").await.unwrap();
        let second = pipeline.retrieve_and_rerank("graph neural networks").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_fewer_candidates_than_k_not_padded() {
        let index = ScriptedIndex::with_texts(&["low", "high", "mid"]);
        let encoder = TableEncoder::new(&[("low", 0.1), ("high", 0.9), ("mid", 0.5)]);
        let pipeline = RetrievePipeline::new(
            VectorRetriever::with_options(MockEmbeddingProvider::new(8), index, options()),
            Reranker::new(encoder),
            15,
            5,
        );

        let papers = pipeline.retrieve_and_rerank("q").await.unwrap();
        let summaries: Vec<_> = papers.iter().map(|p| p.summary_text()).collect();
        assert_eq!(summaries, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_equal_scores_keep_retrieval_order() {
        let index = ScriptedIndex::with_texts(&["a", "b", "c", "d"]);
        let pipeline = RetrievePipeline::new(
            VectorRetriever::with_options(MockEmbeddingProvider::new(8), index, options()),
            Reranker::new(TableEncoder::new(&[("c", 1.0)])),
            15,
            5,
        );

        let run = pipeline.rank("q").await.unwrap();
        let ranks: Vec<_> = run.ranked.iter().map(|r| r.passage.retrieval_rank).collect();
        assert_eq!(ranks, vec![2, 0, 1, 3]);
    }

    #[tokio::test]
    async fn test_missing_metadata_defaults() {
        let embedder = MockEmbeddingProvider::new(8);
        let index = InMemoryIndex::new();
        index
            .add_passages(&[IndexedPassage {
                text: "orphan passage".to_string(),
                metadata: PassageMetadata::default(),
                embedding: embedder.vector("orphan passage"),
            }])
            .await
            .unwrap();
        let pipeline = RetrievePipeline::new(
            VectorRetriever::with_options(embedder, index, options()),
            Reranker::new(TableEncoder::default()),
            15,
            5,
        );

        let papers = pipeline.retrieve_and_rerank("orphan").await.unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].title.as_deref(), Some("Untitled"));
        assert_eq!(papers[0].authors.as_deref(), Some("Unknown"));
        assert_eq!(papers[0].source.as_deref(), Some("VectorDB"));
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_papers() {
        let pipeline = RetrievePipeline::new(
            VectorRetriever::with_options(MockEmbeddingProvider::new(8), InMemoryIndex::new(), options()),
            Reranker::new(TableEncoder::default()),
            15,
            5,
        );
        assert!(pipeline.retrieve_and_rerank("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scoring_failure_does_not_fail_query() {
        let index = ScriptedIndex::with_texts(&["good", "broken", "fine"]);
        let encoder = TableEncoder::new(&[("good", 2.0), ("fine", 1.0)]).poisoned("broken");
        let pipeline = RetrievePipeline::new(
            VectorRetriever::with_options(MockEmbeddingProvider::new(8), index, options()),
            Reranker::new(encoder),
            15,
            2,
        );

        let papers = pipeline.retrieve_and_rerank("q").await.unwrap();
        let summaries: Vec<_> = papers.iter().map(|p| p.summary_text()).collect();
        assert_eq!(summaries, vec!["good", "fine"]);
    }

    #[tokio::test]
    async fn test_errors_map_to_pipeline_errors() {
        let unavailable = RetrievePipeline::new(
            VectorRetriever::with_options(
                MockEmbeddingProvider::new(8),
                ScriptedIndex::with_texts(&["a"]).failing(5),
                options(),
            ),
            Reranker::new(TableEncoder::default()),
            15,
            5,
        );
        assert!(matches!(
            unavailable.retrieve_and_rerank("q").await,
            Err(PipelineError::IndexUnavailable(_))
        ));

        let slow = RetrievePipeline::new(
            VectorRetriever::with_options(
                MockEmbeddingProvider::new(8),
                ScriptedIndex::with_texts(&["a"]),
                options(),
            ),
            Reranker::new(TableEncoder::default().slow(Duration::from_millis(200)))
                .with_deadline(Duration::from_millis(10)),
            15,
            5,
        );
        assert!(matches!(
            slow.retrieve_and_rerank("q").await,
            Err(PipelineError::TimedOut(_))
        ));

        assert!(matches!(
            slow.retrieve_and_rerank("  ").await,
            Err(PipelineError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_zero_sizes_fall_back_to_defaults() {
        let pipeline = RetrievePipeline::new(
            VectorRetriever::new(MockEmbeddingProvider::new(8), ScriptedIndex::default()),
            Reranker::new(TableEncoder::default()),
            0,
            0,
        );
        assert_eq!(pipeline.retrieve_n(), 15);
        assert_eq!(pipeline.keep_k(), 5);
    }
}
