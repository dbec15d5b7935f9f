//! FastEmbed cross-encoder implementation.
//!
//! Wraps fastembed's `TextRerank`, which runs an ONNX cross-encoder locally.
//! The model is loaded on first use and shared across clones.

use std::path::PathBuf;
use std::sync::Arc;

use ::fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use async_trait::async_trait;

use super::{CrossEncoder, RerankError, RerankResult};
use crate::lazy::LazyModel;

/// Cross-encoder backed by a local fastembed reranker model.
#[derive(Clone)]
pub struct FastEmbedCrossEncoder {
    model: Arc<LazyModel<TextRerank>>,
    model_name: String,
}

impl FastEmbedCrossEncoder {
    /// Create a cross-encoder.
    ///
    /// # Arguments
    /// * `model` - Optional reranker model (defaults to BGERerankerBase)
    /// * `cache_dir` - Optional cache directory for model files
    pub fn new(model: Option<RerankerModel>, cache_dir: Option<PathBuf>) -> Self {
        let model_type = model.unwrap_or(RerankerModel::BGERerankerBase);
        let model_name = format!("{:?}", model_type);

        let model = LazyModel::new(move || {
            let mut init_options = RerankInitOptions::new(model_type.clone());
            if let Some(dir) = &cache_dir {
                init_options = init_options.with_cache_dir(dir.clone());
            }
            TextRerank::try_new(init_options)
                .map_err(|e| format!("Failed to initialize reranker model: {}", e))
        });

        Self {
            model: Arc::new(model),
            model_name,
        }
    }
}

#[async_trait]
impl CrossEncoder for FastEmbedCrossEncoder {
    async fn score(&self, query: &str, passages: &[&str]) -> RerankResult<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.get().await.map_err(RerankError::ModelLoad)?;
        let query = query.to_string();
        let documents: Vec<String> = passages.iter().map(|p| p.to_string()).collect();
        let expected = documents.len();

        let results = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| RerankError::ModelScoringFailure("reranker lock poisoned".to_string()))?;
            model
                .rerank(query.as_str(), documents.iter().map(String::as_str).collect::<Vec<_>>(), false, None)
                .map_err(|e| RerankError::ModelScoringFailure(e.to_string()))
        })
        .await
        .map_err(|e| RerankError::ModelScoringFailure(format!("Scoring task failed: {}", e)))??;

        // fastembed returns results sorted by score; put them back in input order
        let mut scores = vec![None; expected];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = Some(result.score);
            }
        }

        scores
            .into_iter()
            .enumerate()
            .map(|(i, score)| {
                score.ok_or_else(|| {
                    RerankError::ModelScoringFailure(format!("No score returned for passage {}", i))
                })
            })
            .collect()
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
