//! In-memory vector index with optional JSON persistence.
//!
//! Passages and their embeddings are held in memory and searched by brute
//! force. When opened with a path, every write is flushed to a JSON file so
//! the index survives restarts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    cosine_similarity, EmbeddingConfig, IndexError, IndexHit, IndexResult, IndexedPassage,
    VectorIndex,
};

/// On-disk layout of a persisted index.
#[derive(Debug, Default, Deserialize)]
struct IndexFile {
    #[serde(default)]
    config: Option<EmbeddingConfig>,
    #[serde(default)]
    passages: Vec<IndexedPassage>,
}

/// Borrowed view of the next on-disk state, written before memory changes.
#[derive(Serialize)]
struct IndexFileView<'a> {
    config: Option<&'a EmbeddingConfig>,
    passages: Vec<&'a IndexedPassage>,
}

/// Brute-force cosine index.
///
/// Suitable for small and medium corpora; search cost is linear in the
/// number of stored passages.
pub struct InMemoryIndex {
    path: Option<PathBuf>,
    state: RwLock<IndexFile>,
}

impl InMemoryIndex {
    /// Create an empty, non-persistent index.
    pub fn new() -> Self {
        Self {
            path: None,
            state: RwLock::new(IndexFile::default()),
        }
    }

    /// Open a persistent index, loading it from `path` if the file exists.
    ///
    /// # Errors
    /// Returns `IndexError::Io` or `IndexError::SerializationError` if an
    /// existing file cannot be read or parsed
    pub async fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: IndexFile = serde_json::from_slice(&bytes).map_err(|e| {
                    IndexError::SerializationError(format!(
                        "Failed to parse index file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                info!(
                    path = %path.display(),
                    passages = file.passages.len(),
                    "loaded vector index"
                );
                file
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "index file missing, starting empty");
                IndexFile::default()
            }
            Err(e) => {
                return Err(IndexError::Io(format!(
                    "Failed to read index file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    /// Write `view` to disk, if this index is persistent.
    async fn persist(&self, view: &IndexFileView<'_>) -> IndexResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IndexError::Io(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let bytes = serde_json::to_vec(view)
            .map_err(|e| IndexError::SerializationError(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| IndexError::Io(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| IndexError::Io(format!("Failed to replace {}: {}", path.display(), e)))?;

        Ok(())
    }

    fn check_dimension(config: Option<&EmbeddingConfig>, actual: usize) -> IndexResult<()> {
        match config {
            Some(config) if config.dimension != actual => Err(IndexError::DimensionMismatch {
                expected: config.dimension,
                actual,
            }),
            _ => Ok(()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn initialize(&self, config: &EmbeddingConfig) -> IndexResult<()> {
        let mut state = self.state.write().await;

        if let Some(existing) = &state.config {
            if existing != config {
                return Err(IndexError::InvalidRequest(format!(
                    "Index already built with model '{}' ({} dims)",
                    existing.model_name, existing.dimension
                )));
            }
            return Ok(());
        }

        self.persist(&IndexFileView {
            config: Some(config),
            passages: state.passages.iter().collect(),
        })
        .await?;
        state.config = Some(config.clone());
        Ok(())
    }

    async fn get_config(&self) -> IndexResult<Option<EmbeddingConfig>> {
        Ok(self.state.read().await.config.clone())
    }

    async fn add_passages(&self, passages: &[IndexedPassage]) -> IndexResult<usize> {
        if passages.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.write().await;
        for passage in passages {
            Self::check_dimension(state.config.as_ref(), passage.embedding.len())?;
        }

        // Memory only changes once the file write has succeeded
        self.persist(&IndexFileView {
            config: state.config.as_ref(),
            passages: state.passages.iter().chain(passages).collect(),
        })
        .await?;
        state.passages.extend_from_slice(passages);

        debug!(added = passages.len(), total = state.passages.len(), "added passages");
        Ok(passages.len())
    }

    async fn search(&self, query_embedding: &[f32], n: usize) -> IndexResult<Vec<IndexHit>> {
        if n == 0 {
            return Err(IndexError::InvalidRequest("n must be greater than zero".to_string()));
        }

        let state = self.state.read().await;
        Self::check_dimension(state.config.as_ref(), query_embedding.len())?;

        let mut scored: Vec<(usize, f32)> = Vec::with_capacity(state.passages.len());
        for (i, passage) in state.passages.iter().enumerate() {
            if passage.embedding.len() != query_embedding.len() {
                return Err(IndexError::DimensionMismatch {
                    expected: passage.embedding.len(),
                    actual: query_embedding.len(),
                });
            }
            scored.push((i, cosine_similarity(query_embedding, &passage.embedding)));
        }

        // Stable: equal similarities keep insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(n);

        Ok(scored
            .into_iter()
            .map(|(i, similarity)| {
                let passage = &state.passages[i];
                IndexHit {
                    text: passage.text.clone(),
                    metadata: passage.metadata.clone(),
                    similarity,
                }
            })
            .collect())
    }

    async fn count(&self) -> IndexResult<usize> {
        Ok(self.state.read().await.passages.len())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PassageMetadata;

    fn passage(title: &str, embedding: Vec<f32>) -> IndexedPassage {
        IndexedPassage {
            text: format!("{} body", title),
            metadata: PassageMetadata {
                title: Some(title.to_string()),
                ..Default::default()
            },
            embedding,
        }
    }

    fn config(dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: "mock-model".to_string(),
            dimension,
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let index = InMemoryIndex::new();
        index.initialize(&config(3)).await.unwrap();
        index
            .add_passages(&[
                passage("far", vec![0.0, 1.0, 0.0]),
                passage("exact", vec![1.0, 0.0, 0.0]),
                passage("close", vec![0.8, 0.6, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 10).await.unwrap();
        let titles: Vec<_> = hits.iter().map(|h| h.metadata.title.clone().unwrap()).collect();
        assert_eq!(titles, vec!["exact", "close", "far"]);
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[tokio::test]
    async fn test_search_truncates_to_n() {
        let index = InMemoryIndex::new();
        let passages: Vec<_> = (0..20)
            .map(|i| passage(&format!("p{}", i), vec![1.0, i as f32]))
            .collect();
        index.add_passages(&passages).await.unwrap();

        assert_eq!(index.search(&[1.0, 0.0], 15).await.unwrap().len(), 15);
        assert_eq!(index.count().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_equal_similarity_keeps_insertion_order() {
        let index = InMemoryIndex::new();
        index
            .add_passages(&[
                passage("first", vec![1.0, 0.0]),
                passage("second", vec![2.0, 0.0]),
                passage("third", vec![3.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 3).await.unwrap();
        let titles: Vec<_> = hits.iter().map(|h| h.metadata.title.clone().unwrap()).collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let index = InMemoryIndex::new();
        index.initialize(&config(3)).await.unwrap();

        let insert = index.add_passages(&[passage("bad", vec![1.0, 0.0])]).await;
        assert!(matches!(insert, Err(IndexError::DimensionMismatch { expected: 3, actual: 2 })));

        let search = index.search(&[1.0], 5).await;
        assert!(matches!(search, Err(IndexError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_zero_n_rejected() {
        let index = InMemoryIndex::new();
        assert!(matches!(
            index.search(&[1.0], 0).await,
            Err(IndexError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_initialize_rejects_different_model() {
        let index = InMemoryIndex::new();
        index.initialize(&config(3)).await.unwrap();
        index.initialize(&config(3)).await.unwrap();
        assert!(index.initialize(&config(4)).await.is_err());
    }

    #[tokio::test]
    async fn test_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.json");

        {
            let index = InMemoryIndex::open(&path).await.unwrap();
            index.initialize(&config(2)).await.unwrap();
            index
                .add_passages(&[passage("a", vec![1.0, 0.0]), passage("b", vec![0.0, 1.0])])
                .await
                .unwrap();
        }

        let reopened = InMemoryIndex::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        assert_eq!(reopened.get_config().await.unwrap(), Some(config(2)));

        let hits = reopened.search(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].metadata.title.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_index_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let index = InMemoryIndex::open(&path).await.unwrap();
        index.add_passages(&[passage("kept", vec![1.0, 0.0])]).await.unwrap();

        // A directory in place of the temp file makes the next write fail
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();

        let result = index.add_passages(&[passage("ghost", vec![0.0, 1.0])]).await;
        assert!(matches!(result, Err(IndexError::Io(_))));
        assert_eq!(index.count().await.unwrap(), 1);
        let hits = index.search(&[0.0, 1.0], 5).await.unwrap();
        assert!(hits.iter().all(|h| h.metadata.title.as_deref() != Some("ghost")));

        assert!(index.initialize(&config(2)).await.is_err());
        assert_eq!(index.get_config().await.unwrap(), None);

        std::fs::remove_dir(path.with_extension("json.tmp")).unwrap();
        index.add_passages(&[passage("next", vec![1.0, 1.0])]).await.unwrap();

        let reopened = InMemoryIndex::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        let hits = reopened.search(&[0.0, 1.0], 5).await.unwrap();
        assert!(hits.iter().all(|h| h.metadata.title.as_deref() != Some("ghost")));
    }

    #[tokio::test]
    async fn test_open_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, b"not json").unwrap();

        assert!(matches!(
            InMemoryIndex::open(&path).await,
            Err(IndexError::SerializationError(_))
        ));
    }
}
