//! Semantic Scholar Graph API provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{PaperProvider, ProviderError, ProviderResult};
use crate::models::PaperRecord;

/// Paper search endpoint.
pub const SEARCH_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";

/// Source tag for records from this provider.
pub const SOURCE_NAME: &str = "Semantic Scholar";

/// Summary used when a paper has no abstract.
pub const MISSING_ABSTRACT: &str = "Summary not available.";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<Author>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: Option<String>,
}

impl From<SearchItem> for PaperRecord {
    fn from(item: SearchItem) -> Self {
        let authors = item
            .authors
            .into_iter()
            .map(|a| a.name.unwrap_or_default())
            .collect::<Vec<_>>()
            .join(", ");

        PaperRecord {
            title: item.title,
            authors: Some(authors),
            summary: Some(item.abstract_text.unwrap_or_else(|| MISSING_ABSTRACT.to_string())),
            source: Some(SOURCE_NAME.to_string()),
            url: Some(item.url.unwrap_or_default()),
        }
    }
}

/// Searches the Semantic Scholar paper index.
pub struct SemanticScholarProvider {
    client: Client,
    search_url: String,
}

impl SemanticScholarProvider {
    /// Create a provider.
    ///
    /// # Errors
    /// Returns `ProviderError::ConfigError` if the HTTP client cannot be built
    pub fn new(request_timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| ProviderError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            search_url: SEARCH_URL.to_string(),
        })
    }

    /// Use a different search endpoint.
    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }
}

fn parse_search_response(body: &str) -> ProviderResult<Vec<PaperRecord>> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::ParseError(format!("Invalid Semantic Scholar response: {}", e)))?;
    Ok(response.data.into_iter().map(PaperRecord::from).collect())
}

#[async_trait]
impl PaperProvider for SemanticScholarProvider {
    async fn search(&self, query: &str, max_results: usize) -> ProviderResult<Vec<PaperRecord>> {
        let limit = max_results.to_string();
        let response = self
            .client
            .get(&self.search_url)
            .query(&[
                ("query", query),
                ("limit", limit.as_str()),
                ("fields", "title,authors,abstract,url"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        match status {
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimitExceeded(body)),
            s if !s.is_success() => Err(ProviderError::Other(format!("HTTP {}: {}", s, body))),
            _ => {
                let mut papers = parse_search_response(&body)?;
                papers.truncate(max_results);
                debug!(count = papers.len(), "parsed Semantic Scholar results");
                Ok(papers)
            }
        }
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_item() {
        let body = r#"{
            "total": 1,
            "data": [{
                "paperId": "abc",
                "title": "Semi-Supervised Classification with Graph Convolutional Networks",
                "authors": [{"authorId": "1", "name": "Thomas Kipf"}, {"authorId": "2", "name": "Max Welling"}],
                "abstract": "We present a scalable approach.",
                "url": "https://www.semanticscholar.org/paper/abc"
            }]
        }"#;

        let papers = parse_search_response(body).unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].authors.as_deref(), Some("Thomas Kipf, Max Welling"));
        assert_eq!(papers[0].summary.as_deref(), Some("We present a scalable approach."));
        assert_eq!(papers[0].source.as_deref(), Some("Semantic Scholar"));
    }

    #[test]
    fn test_parse_missing_fields() {
        let body = r#"{"data": [{"title": "No Abstract", "abstract": null}]}"#;
        let papers = parse_search_response(body).unwrap();
        assert_eq!(papers[0].summary.as_deref(), Some(MISSING_ABSTRACT));
        assert_eq!(papers[0].authors.as_deref(), Some(""));
        assert_eq!(papers[0].url.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_no_data() {
        assert!(parse_search_response(r#"{"total": 0}"#).unwrap().is_empty());
        assert!(parse_search_response("<html>").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let provider = SemanticScholarProvider::new(Duration::from_secs(2))
            .unwrap()
            .with_search_url("http://127.0.0.1:1/search");
        assert!(matches!(
            provider.search("q", 5).await,
            Err(ProviderError::NetworkError(_))
        ));
    }
}
