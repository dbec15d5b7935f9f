//! CORE provider.
//!
//! CORE's API needs a key, so this provider synthesizes results with a
//! short artificial latency instead of calling it.

use std::time::Duration;

use async_trait::async_trait;

use super::{PaperProvider, ProviderResult};
use crate::models::PaperRecord;

/// Source tag for records from this provider.
pub const SOURCE_NAME: &str = "CORE";

/// Simulated CORE search.
#[derive(Debug, Clone)]
pub struct CoreProvider {
    latency: Duration,
}

impl CoreProvider {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(100),
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for CoreProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaperProvider for CoreProvider {
    async fn search(&self, query: &str, max_results: usize) -> ProviderResult<Vec<PaperRecord>> {
        let papers = (1..=max_results)
            .map(|i| PaperRecord {
                title: Some(format!("CORE Paper {} on {}", i, query)),
                authors: Some("Author X, Author Y".to_string()),
                summary: Some(format!("Summary of CORE Paper {} related to {}", i, query)),
                source: Some(SOURCE_NAME.to_string()),
                url: Some(format!("https://core.ac.uk/paper/{}", i)),
            })
            .collect();

        tokio::time::sleep(self.latency).await;
        Ok(papers)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_results() {
        let provider = CoreProvider::with_latency(Duration::ZERO);
        let papers = provider.search("federated learning", 3).await.unwrap();

        assert_eq!(papers.len(), 3);
        assert_eq!(papers[0].title.as_deref(), Some("CORE Paper 1 on federated learning"));
        assert_eq!(papers[2].url.as_deref(), Some("https://core.ac.uk/paper/3"));
        assert!(papers.iter().all(|p| p.source.as_deref() == Some("CORE")));
    }

    #[tokio::test]
    async fn test_zero_results() {
        let provider = CoreProvider::with_latency(Duration::ZERO);
        assert!(provider.search("q", 0).await.unwrap().is_empty());
    }
}
