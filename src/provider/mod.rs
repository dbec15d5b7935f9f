//! Paper provider module.
//!
//! This module defines the interface for searching external paper catalogues
//! and includes implementations for different sources.
//!
//! The `PaperProvider` trait abstracts where paper metadata comes from, so
//! [`fetch_papers`] can query every source at once, merge the results, and
//! drop duplicates without knowing anything about the individual APIs.

pub mod arxiv;
pub mod core_ac;
pub mod semantic_scholar;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{deduplicate_papers, PaperRecord};

/// Maximum number of papers returned by [`fetch_papers`].
pub const MAX_FETCHED_PAPERS: usize = 10;

/// Errors that can occur when fetching papers from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to parse the response
    #[error("Parse error: {0}")]
    ParseError(String),

    /// API rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Other provider-specific errors
    #[error("Provider error: {0}")]
    Other(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for searching a paper catalogue.
///
/// Providers return records as the source describes them; they do not
/// deduplicate (that happens in [`fetch_papers`]).
#[async_trait]
pub trait PaperProvider: Send + Sync {
    /// Search for papers matching `query`.
    ///
    /// # Returns
    /// At most `max_results` papers, in the source's relevance order
    ///
    /// # Errors
    /// Returns `ProviderError` if the source cannot be reached or its
    /// response cannot be parsed
    async fn search(&self, query: &str, max_results: usize) -> ProviderResult<Vec<PaperRecord>>;

    /// How many results to request when the caller does not say.
    fn default_max_results(&self) -> usize {
        5
    }

    /// Human-readable name for logging and the `source` field.
    fn name(&self) -> &str;
}

/// Query every provider concurrently and merge the results.
///
/// Results keep provider order, then each provider's own order. Papers with
/// a title already seen (case and whitespace insensitive) are dropped and the
/// first [`MAX_FETCHED_PAPERS`] survivors are returned. A failing provider is
/// logged and contributes nothing.
pub async fn fetch_papers(providers: &[Box<dyn PaperProvider>], query: &str) -> Vec<PaperRecord> {
    let searches = providers.iter().map(|provider| async move {
        let max_results = provider.default_max_results();
        match provider.search(query, max_results).await {
            Ok(papers) => {
                info!(provider = provider.name(), count = papers.len(), "fetched papers");
                papers
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "paper source failed");
                Vec::new()
            }
        }
    });

    let all_papers: Vec<PaperRecord> = join_all(searches).await.into_iter().flatten().collect();
    let mut unique = deduplicate_papers(all_papers);
    unique.truncate(MAX_FETCHED_PAPERS);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        name: &'static str,
        titles: Vec<&'static str>,
        fail: bool,
    }

    #[async_trait]
    impl PaperProvider for FixedProvider {
        async fn search(&self, _query: &str, max_results: usize) -> ProviderResult<Vec<PaperRecord>> {
            if self.fail {
                return Err(ProviderError::NetworkError("connection reset".to_string()));
            }
            Ok(self
                .titles
                .iter()
                .take(max_results)
                .map(|t| PaperRecord {
                    title: Some(t.to_string()),
                    source: Some(self.name.to_string()),
                    ..Default::default()
                })
                .collect())
        }

        fn default_max_results(&self) -> usize {
            20
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn provider(name: &'static str, titles: Vec<&'static str>) -> Box<dyn PaperProvider> {
        Box::new(FixedProvider {
            name,
            titles,
            fail: false,
        })
    }

    #[tokio::test]
    async fn test_merges_in_provider_order_and_dedups() {
        let providers = vec![
            provider("one", vec!["Graph Attention Networks", "GraphSAGE"]),
            provider("two", vec!["graph attention  networks", "GIN"]),
        ];

        let papers = fetch_papers(&providers, "gnn").await;
        let titles: Vec<_> = papers.iter().map(|p| p.display_title()).collect();
        assert_eq!(titles, vec!["Graph Attention Networks", "GraphSAGE", "GIN"]);
        assert_eq!(papers[0].source.as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn test_truncates_to_ten() {
        let titles: Vec<&'static str> = vec![
            "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l",
        ];
        let papers = fetch_papers(&[provider("many", titles)], "q").await;
        assert_eq!(papers.len(), MAX_FETCHED_PAPERS);
    }

    #[tokio::test]
    async fn test_failing_provider_is_skipped() {
        let providers: Vec<Box<dyn PaperProvider>> = vec![
            Box::new(FixedProvider {
                name: "down",
                titles: vec![],
                fail: true,
            }),
            provider("up", vec!["BERT"]),
        ];
        let papers = fetch_papers(&providers, "q").await;
        assert_eq!(papers.len(), 1);
    }

    #[tokio::test]
    async fn test_no_providers() {
        assert!(fetch_papers(&[], "q").await.is_empty());
    }
}
