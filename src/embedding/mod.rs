//! Text embeddings for vector retrieval.
//!
//! One [`EmbeddingProvider`] embeds both sides of the vector search: passages
//! at ingestion time and questions at query time. Both sides must come from
//! the same model, which is why indexes record the provider's
//! [`model_name`](EmbeddingProvider::model_name) and
//! [`dimension`](EmbeddingProvider::dimension).
//!
//! Text is passed through [`normalize_text`] before embedding on both paths.

pub mod fastembed;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while embedding text.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The model could not be downloaded or initialized
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// Blank text, or a batch containing blank text
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// The model ran but produced no usable vectors
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// A model that maps text to fixed-length vectors.
///
/// Implementations load their model lazily and are shared between concurrent
/// queries, so every method takes `&self`.
///
/// ```ignore
/// let provider = FastEmbedProvider::new(None, None);
/// let query = normalize_text("  Graph Neural   Networks ");
/// let vector = provider.embed(&query).await?;
/// assert_eq!(vector.len(), provider.dimension());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single query.
    ///
    /// # Errors
    /// `InvalidInput` for blank text, `ModelLoad` or `Inference` if the model
    /// fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Embed a batch of passages; one vector per text, in input order.
    ///
    /// An empty batch returns an empty result without loading the model.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Model identifier stored alongside the index (e.g. "AllMiniLML6V2").
    fn model_name(&self) -> &str;
}

/// Lowercase `text` and collapse runs of whitespace to single spaces.
///
/// Applied to passages before indexing and to questions before retrieval, so
/// casing and layout differences do not move vectors apart.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
