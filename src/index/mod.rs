//! Vector index abstraction and implementations.
//!
//! This module defines the interface for persisting passage embeddings and
//! querying them by vector similarity. Two backends are provided:
//!
//! - [`memory::InMemoryIndex`]: brute-force cosine search, optionally
//!   persisted to a JSON file
//! - [`opensearch::OpenSearchIndex`]: k-NN search against an OpenSearch index
//!
//! Search is read-only. Writes happen only through ingestion.

pub mod memory;
pub mod opensearch;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::{IndexKind, RagConfig};
use crate::models::PassageMetadata;
use memory::InMemoryIndex;
use opensearch::OpenSearchIndex;

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Backend unreachable or failing server-side; safe to retry
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer within the request timeout; not retried
    #[error("Index request timed out after {0:?}")]
    TimedOut(Duration),

    /// Invalid search or insert parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Vector dimension does not match the index
    #[error("Dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Data serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Backend rejected the request
    #[error("Backend error: {0}")]
    Backend(String),

    /// Local persistence failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl IndexError {
    /// Whether retrying the same read could succeed.
    ///
    /// This is the retriever's retry predicate: only an unreachable backend
    /// qualifies.
    pub fn is_transient(&self) -> bool {
        matches!(self, IndexError::Unavailable(_))
    }
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Configuration for the embedding model an index was built with.
///
/// Stored alongside the index so query-time embeddings are produced by the
/// same model that embedded the passages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Name/identifier of the embedding model (e.g., "AllMiniLML6V2")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}

/// A passage to be written into the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedPassage {
    pub text: String,
    pub metadata: PassageMetadata,
    pub embedding: Vec<f32>,
}

/// A single search hit, in index order.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub text: String,
    pub metadata: PassageMetadata,
    pub similarity: f32,
}

/// Trait for vector index backends.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Prepare the index for writes and record its embedding configuration.
    ///
    /// This should be idempotent and safe to call multiple times.
    async fn initialize(&self, config: &EmbeddingConfig) -> IndexResult<()>;

    /// Retrieve the embedding configuration, if the index has one.
    async fn get_config(&self) -> IndexResult<Option<EmbeddingConfig>>;

    /// Add passages with their embeddings.
    ///
    /// # Returns
    /// The number of passages written
    async fn add_passages(&self, passages: &[IndexedPassage]) -> IndexResult<usize>;

    /// Return up to `n` passages most similar to `query_embedding`,
    /// most similar first.
    ///
    /// # Errors
    /// Returns `IndexError::Unavailable` if the backend cannot be reached
    async fn search(&self, query_embedding: &[f32], n: usize) -> IndexResult<Vec<IndexHit>>;

    /// Number of passages stored.
    async fn count(&self) -> IndexResult<usize>;

    /// Human-readable backend name for logging.
    fn name(&self) -> &str;
}

/// Index selected at runtime from configuration.
pub enum IndexBackend {
    Memory(InMemoryIndex),
    OpenSearch(OpenSearchIndex),
}

impl IndexBackend {
    /// Open the index named by `config`.
    ///
    /// # Errors
    /// Returns `IndexError` if a local index file cannot be loaded or the
    /// OpenSearch client cannot be built
    pub async fn from_config(config: &RagConfig) -> IndexResult<Self> {
        match config.index_kind {
            IndexKind::Memory => {
                info!(path = %config.index_path.display(), "using local vector index");
                Ok(IndexBackend::Memory(InMemoryIndex::open(&config.index_path).await?))
            }
            IndexKind::OpenSearch => {
                info!(
                    url = %config.opensearch_url,
                    index = %config.opensearch_index,
                    "using OpenSearch vector index"
                );
                Ok(IndexBackend::OpenSearch(OpenSearchIndex::new(
                    config.opensearch_url.clone(),
                    config.opensearch_index.clone(),
                    config.timeout(),
                )?))
            }
        }
    }
}

#[async_trait]
impl VectorIndex for IndexBackend {
    async fn initialize(&self, config: &EmbeddingConfig) -> IndexResult<()> {
        match self {
            IndexBackend::Memory(index) => index.initialize(config).await,
            IndexBackend::OpenSearch(index) => index.initialize(config).await,
        }
    }

    async fn get_config(&self) -> IndexResult<Option<EmbeddingConfig>> {
        match self {
            IndexBackend::Memory(index) => index.get_config().await,
            IndexBackend::OpenSearch(index) => index.get_config().await,
        }
    }

    async fn add_passages(&self, passages: &[IndexedPassage]) -> IndexResult<usize> {
        match self {
            IndexBackend::Memory(index) => index.add_passages(passages).await,
            IndexBackend::OpenSearch(index) => index.add_passages(passages).await,
        }
    }

    async fn search(&self, query_embedding: &[f32], n: usize) -> IndexResult<Vec<IndexHit>> {
        match self {
            IndexBackend::Memory(index) => index.search(query_embedding, n).await,
            IndexBackend::OpenSearch(index) => index.search(query_embedding, n).await,
        }
    }

    async fn count(&self) -> IndexResult<usize> {
        match self {
            IndexBackend::Memory(index) => index.count().await,
            IndexBackend::OpenSearch(index) => index.count().await,
        }
    }

    fn name(&self) -> &str {
        match self {
            IndexBackend::Memory(index) => index.name(),
            IndexBackend::OpenSearch(index) => index.name(),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude. Callers are expected to
/// have checked that the lengths match.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have the same length");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);

        let a = vec![1.0, 1.0];
        let b = vec![-1.0, -1.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_backend_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = RagConfig {
            index_path: dir.path().join("index.json"),
            ..Default::default()
        };
        let backend = IndexBackend::from_config(&config).await.unwrap();
        assert_eq!(backend.name(), "in-memory");
        assert_eq!(backend.count().await.unwrap(), 0);

        let config = RagConfig {
            index_kind: IndexKind::OpenSearch,
            ..Default::default()
        };
        let backend = IndexBackend::from_config(&config).await.unwrap();
        assert!(matches!(backend, IndexBackend::OpenSearch(_)));
    }

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(IndexError::Unavailable("down".into()).is_transient());
        assert!(!IndexError::Backend("400".into()).is_transient());
        assert!(!IndexError::DimensionMismatch { expected: 3, actual: 2 }.is_transient());
        assert!(!IndexError::TimedOut(Duration::from_secs(1)).is_transient());
    }
}
