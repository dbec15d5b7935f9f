//! Test doubles shared across module tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::embedding::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use crate::index::{
    EmbeddingConfig, IndexError, IndexHit, IndexResult, IndexedPassage, VectorIndex,
};
use crate::models::PassageMetadata;

/// Bag-of-words embedder: each word bumps one of `dimension` buckets.
#[derive(Clone)]
pub(crate) struct MockEmbeddingProvider {
    dimension: usize,
    should_fail: bool,
    pub(crate) calls: Arc<Mutex<Vec<String>>>,
}

impl MockEmbeddingProvider {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            should_fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Self::new(8)
        }
    }

    pub(crate) fn vector(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimension];
        for word in text.split_whitespace() {
            let bucket = word.bytes().map(|b| b as usize).sum::<usize>() % self.dimension;
            embedding[bucket] += 1.0;
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if self.should_fail {
            return Err(EmbeddingError::Inference("mock inference failure".to_string()));
        }
        self.calls.lock().unwrap().push(text.to_string());
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut results = Vec::new();
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Index that returns a fixed hit list, optionally failing or stalling first.
#[derive(Clone, Default)]
pub(crate) struct ScriptedIndex {
    hits: Vec<IndexHit>,
    /// Number of leading calls that fail with `Unavailable`
    failures: usize,
    /// Number of leading calls that fail with a transport `TimedOut`
    timeouts: usize,
    /// Delay applied to every call
    delay: Option<Duration>,
    pub(crate) calls: Arc<AtomicUsize>,
}

impl ScriptedIndex {
    pub(crate) fn with_texts(texts: &[&str]) -> Self {
        Self {
            hits: texts
                .iter()
                .enumerate()
                .map(|(i, text)| IndexHit {
                    text: text.to_string(),
                    metadata: PassageMetadata {
                        title: Some(format!("Paper {}", i)),
                        ..Default::default()
                    },
                    similarity: 1.0 - i as f32 * 0.01,
                })
                .collect(),
            ..Default::default()
        }
    }

    pub(crate) fn failing(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    pub(crate) fn timing_out(mut self, timeouts: usize) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub(crate) fn stalled(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    async fn initialize(&self, _config: &EmbeddingConfig) -> IndexResult<()> {
        Ok(())
    }

    async fn get_config(&self) -> IndexResult<Option<EmbeddingConfig>> {
        Ok(None)
    }

    async fn add_passages(&self, passages: &[IndexedPassage]) -> IndexResult<usize> {
        Ok(passages.len())
    }

    async fn search(&self, _query_embedding: &[f32], n: usize) -> IndexResult<Vec<IndexHit>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if call < self.timeouts {
            return Err(IndexError::TimedOut(Duration::from_secs(30)));
        }
        if call < self.failures {
            return Err(IndexError::Unavailable("connection refused".to_string()));
        }
        Ok(self.hits.iter().take(n).cloned().collect())
    }

    async fn count(&self) -> IndexResult<usize> {
        Ok(self.hits.len())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
