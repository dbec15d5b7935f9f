//! Ingestion pipeline module.
//!
//! This module handles the offline pipeline that loads documents, splits them
//! into overlapping chunks, embeds the chunks, and writes them to a vector
//! index.
//!
//! # Usage Patterns
//!
//! ## Primary: Adding Documents to an Existing Index
//! The typical workflow is to connect to an index that already records which
//! embedding model built it:
//!
//! ```ignore
//! use paper_rag::ingestion::{load_documents_from_directory, IngestionPipeline};
//! use paper_rag::index::memory::InMemoryIndex;
//! use paper_rag::embedding::fastembed::FastEmbedProvider;
//!
//! let index = InMemoryIndex::open("data/index.json").await?;
//! let pipeline = IngestionPipeline::connect(FastEmbedProvider::new(None, None), index, None).await?;
//!
//! let documents = load_documents_from_directory("data/papers")?;
//! let stats = pipeline.ingest_documents(&documents).await?;
//! println!("Indexed {} chunks", stats.indexed);
//! ```
//!
//! The pipeline validates that the embedding provider matches the model the
//! index was built with, so queries and passages share one vector space.
//!
//! ## Secondary: Creating a New Index
//! ```ignore
//! let pipeline = IngestionPipeline::initialize_new(provider, index, None).await?;
//! pipeline.ingest_documents(&documents).await?;
//! ```

pub mod chunker;

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::index::{EmbeddingConfig, IndexedPassage, VectorIndex};
use crate::models::PassageMetadata;
use chunker::TextChunker;

/// File extensions picked up by [`load_documents_from_directory`].
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Index operation failed
    #[error("Index error: {0}")]
    IndexError(String),

    /// Reading source documents failed
    #[error("IO error: {0}")]
    IoError(String),

    /// Invalid input data or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// A source document, or one chunk of one.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub text: String,
    pub metadata: PassageMetadata,
}

/// Statistics from an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionStats {
    /// Source documents chunked
    pub documents: usize,

    /// Chunks produced
    pub chunks: usize,

    /// Chunks written to the index
    pub indexed: usize,

    /// Chunks the index rejected
    pub failed: usize,
}

impl IngestionStats {
    /// Create new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_indexed(&mut self, count: usize) {
        self.indexed += count;
    }

    pub fn record_failed(&mut self, count: usize) {
        self.failed += count;
    }

    /// Fold another run's numbers into this one.
    pub fn merge(&mut self, other: &IngestionStats) {
        self.documents += other.documents;
        self.chunks += other.chunks;
        self.indexed += other.indexed;
        self.failed += other.failed;
    }
}

/// Ingestion pipeline coordinator.
///
/// Orchestrates chunking, embedding generation, and index writes.
pub struct IngestionPipeline<E, I>
where
    E: EmbeddingProvider,
    I: VectorIndex,
{
    /// Embedding provider for generating chunk embeddings
    embedding_provider: E,

    /// Index receiving the chunks
    index: I,

    chunker: TextChunker,

    /// Chunks embedded and written per batch
    batch_size: usize,
}

impl<E, I> IngestionPipeline<E, I>
where
    E: EmbeddingProvider,
    I: VectorIndex,
{
    fn extract_config(provider: &E) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: provider.model_name().to_string(),
            dimension: provider.dimension(),
        }
    }

    /// Connect to an existing index and prepare for ingestion.
    ///
    /// # Errors
    /// Returns `IngestionError::InvalidInput` if:
    /// - The index has no embedding configuration
    /// - The provider's configuration doesn't match the stored configuration
    pub async fn connect(embedding_provider: E, index: I, batch_size: Option<usize>) -> IngestionResult<Self> {
        let stored_config = index
            .get_config()
            .await
            .map_err(|e| IngestionError::IndexError(e.to_string()))?
            .ok_or_else(|| {
                IngestionError::InvalidInput(
                    "Index has no embedding configuration. Use initialize_new() for a new index.".to_string(),
                )
            })?;

        let provider_config = Self::extract_config(&embedding_provider);

        if provider_config.model_name != stored_config.model_name {
            return Err(IngestionError::InvalidInput(format!(
                "Embedding model mismatch: provider uses '{}' but index has '{}'",
                provider_config.model_name, stored_config.model_name
            )));
        }

        if provider_config.dimension != stored_config.dimension {
            return Err(IngestionError::InvalidInput(format!(
                "Embedding dimension mismatch: provider has {} but index has {}",
                provider_config.dimension, stored_config.dimension
            )));
        }

        Ok(Self::build(embedding_provider, index, batch_size))
    }

    /// Initialize a new index with the given embedding provider.
    ///
    /// # Errors
    /// Returns `IngestionError::IndexError` if the index cannot be created or
    /// was already built with a different model
    pub async fn initialize_new(embedding_provider: E, index: I, batch_size: Option<usize>) -> IngestionResult<Self> {
        let config = Self::extract_config(&embedding_provider);
        index
            .initialize(&config)
            .await
            .map_err(|e| IngestionError::IndexError(e.to_string()))?;

        info!(
            index = index.name(),
            model = %config.model_name,
            dimension = config.dimension,
            "initialized index"
        );
        Ok(Self::build(embedding_provider, index, batch_size))
    }

    fn build(embedding_provider: E, index: I, batch_size: Option<usize>) -> Self {
        Self {
            embedding_provider,
            index,
            chunker: TextChunker::default(),
            batch_size: batch_size.filter(|&n| n > 0).unwrap_or(100),
        }
    }

    /// Use a different chunker.
    pub fn with_chunker(mut self, chunker: TextChunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Split documents into chunks; each chunk inherits its document's
    /// metadata.
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Document> {
        documents
            .iter()
            .flat_map(|doc| {
                self.chunker.split(&doc.text).into_iter().map(|text| Document {
                    text,
                    metadata: doc.metadata.clone(),
                })
            })
            .collect()
    }

    /// Embed one batch of chunks and write it to the index.
    ///
    /// # Errors
    /// Returns `IngestionError::EmbeddingError` if embedding fails. An index
    /// write failure is counted in `failed` instead.
    pub async fn ingest_chunks(&self, chunks: &[Document]) -> IngestionResult<IngestionStats> {
        let mut stats = IngestionStats::new();
        if chunks.is_empty() {
            return Ok(stats);
        }

        let normalized: Vec<String> = chunks.iter().map(|c| normalize_text(&c.text)).collect();
        let refs: Vec<&str> = normalized.iter().map(String::as_str).collect();
        let embeddings = self
            .embedding_provider
            .embed_batch(&refs)
            .await
            .map_err(|e| IngestionError::EmbeddingError(e.to_string()))?;

        if embeddings.len() != chunks.len() {
            return Err(IngestionError::EmbeddingError(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let passages: Vec<IndexedPassage> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedPassage {
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                embedding,
            })
            .collect();

        match self.index.add_passages(&passages).await {
            Ok(written) => stats.record_indexed(written),
            Err(e) => {
                warn!(error = %e, chunks = passages.len(), "failed to write batch");
                stats.record_failed(passages.len());
            }
        }
        Ok(stats)
    }

    /// Chunk, embed, and index `documents`.
    ///
    /// # Returns
    /// Statistics about the ingestion run
    pub async fn ingest_documents(&self, documents: &[Document]) -> IngestionResult<IngestionStats> {
        self.ingest_documents_with_progress(documents, |_| {}).await
    }

    /// Like [`ingest_documents`](Self::ingest_documents), calling
    /// `on_batch` with the running totals after every batch.
    ///
    /// `chunks` is final from the first call on, so callers can size a
    /// progress display from it.
    pub async fn ingest_documents_with_progress<F>(
        &self,
        documents: &[Document],
        mut on_batch: F,
    ) -> IngestionResult<IngestionStats>
    where
        F: FnMut(&IngestionStats),
    {
        let chunks = self.chunk_documents(documents);
        let mut stats = IngestionStats {
            documents: documents.len(),
            chunks: chunks.len(),
            ..Default::default()
        };

        for batch in chunks.chunks(self.batch_size) {
            let batch_stats = self.ingest_chunks(batch).await?;
            stats.merge(&batch_stats);
            debug!(indexed = stats.indexed, total = stats.chunks, "batch written");
            on_batch(&stats);
        }

        info!(
            documents = stats.documents,
            chunks = stats.chunks,
            indexed = stats.indexed,
            failed = stats.failed,
            "ingestion finished"
        );
        Ok(stats)
    }
}

/// Load every `.txt` and `.md` file under `dir`, recursively.
///
/// The title is the file stem and the source is the file path. Files are
/// returned in path order.
///
/// # Errors
/// Returns `IngestionError::IoError` if the directory cannot be walked or a
/// file cannot be read as UTF-8
pub fn load_documents_from_directory(dir: impl AsRef<Path>) -> IngestionResult<Vec<Document>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(IngestionError::IoError(format!("Not a directory: {}", dir.display())));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| IngestionError::IoError(e.to_string()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_supported(path) {
            continue;
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| IngestionError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        documents.push(Document {
            text,
            metadata: PassageMetadata {
                title: path.file_stem().map(|s| s.to_string_lossy().to_string()),
                source: Some(path.display().to_string()),
                ..Default::default()
            },
        });
    }

    debug!(dir = %dir.display(), count = documents.len(), "loaded documents");
    Ok(documents)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
