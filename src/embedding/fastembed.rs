//! FastEmbed embedding provider implementation.
//!
//! This module provides an implementation of the `EmbeddingProvider` trait
//! using the fastembed library for local embedding generation.
//!
//! The ONNX model is not touched at construction time: it is downloaded and
//! loaded on the first embedding request and then shared by every clone of
//! the provider.

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use crate::lazy::LazyModel;
use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Default embedding dimension for AllMiniLML6V2.
pub const DEFAULT_DIMENSION: usize = 384;

/// FastEmbed embedding provider configuration.
///
/// This struct holds the configuration and lazily loaded model instance for
/// generating embeddings using the fastembed library.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// The embedding model, loaded on first use
    model: Arc<LazyModel<TextEmbedding>>,

    /// Model identifier
    model_name: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed embedding provider.
    ///
    /// # Arguments
    /// * `model` - Optional model to use (defaults to AllMiniLML6V2)
    /// * `cache_dir` - Optional cache directory for model files
    pub fn new(model: Option<EmbeddingModel>, cache_dir: Option<PathBuf>) -> Self {
        let model_type = model.unwrap_or(EmbeddingModel::AllMiniLML6V2);
        let model_name = format!("{:?}", model_type);

        let embedding_dimension = match model_type {
            EmbeddingModel::AllMiniLML6V2 => 384,
            EmbeddingModel::BGESmallENV15 => 384,
            EmbeddingModel::BGEBaseENV15 => 768,
            EmbeddingModel::BGELargeENV15 => 1024,
            EmbeddingModel::NomicEmbedTextV15 => 768,
            EmbeddingModel::ParaphraseMLMiniLML12V2 => 384,
            _ => DEFAULT_DIMENSION,
        };

        let model = LazyModel::new(move || {
            let mut init_options = InitOptions::new(model_type.clone());
            if let Some(dir) = &cache_dir {
                init_options = init_options.with_cache_dir(dir.clone());
            }
            TextEmbedding::try_new(init_options)
                .map_err(|e| format!("Failed to initialize FastEmbed model: {}", e))
        });

        Self {
            model: Arc::new(model),
            model_name,
            embedding_dimension,
        }
    }

    async fn run(&self, texts: Vec<String>) -> EmbeddingResult<Vec<Vec<f32>>> {
        let model = self.model.get().await.map_err(EmbeddingError::ModelLoad)?;

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EmbeddingError::Inference("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| EmbeddingError::Inference(format!("Embedding generation failed: {}", e)))
        })
        .await
        .map_err(|e| EmbeddingError::Inference(format!("Embedding task failed: {}", e)))?
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }

        self.run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Inference("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        if texts.iter().any(|text| text.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("All texts must be non-empty".to_string()));
        }

        let embeddings = self
            .run(texts.iter().map(|s| s.to_string()).collect())
            .await?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::Inference(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_metadata() {
        let provider = FastEmbedProvider::new(None, None);
        assert_eq!(provider.dimension(), 384);
        assert_eq!(provider.model_name(), "AllMiniLML6V2");
    }

    #[test]
    fn test_construction_does_not_load_model() {
        let provider = FastEmbedProvider::new(Some(EmbeddingModel::BGEBaseENV15), None);
        assert_eq!(provider.dimension(), 768);
        assert!(!provider.model.is_loaded());
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_loading() {
        let provider = FastEmbedProvider::new(None, None);
        let result = provider.embed("   ").await;
        assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));
        assert!(!provider.model.is_loaded());
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let provider = FastEmbedProvider::new(None, None);
        assert!(provider.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires downloading the model
    async fn test_fastembed_embedding() {
        let provider = FastEmbedProvider::new(None, None);
        let embedding = provider.embed("graph neural networks").await.unwrap();
        assert_eq!(embedding.len(), provider.dimension());
    }
}
