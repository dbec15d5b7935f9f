//! arXiv Atom API provider.
//!
//! The export API answers with an Atom feed; each `<entry>` becomes one
//! [`PaperRecord`]. Authors are joined with ", " and the URL is the entry's
//! alternate (abstract page) link.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::{PaperProvider, ProviderError, ProviderResult};
use crate::models::PaperRecord;

/// Query endpoint of the arXiv export API.
pub const QUERY_URL: &str = "http://export.arxiv.org/api/query";

/// Source tag for records from this provider.
pub const SOURCE_NAME: &str = "arXiv";

/// Fields of the entry currently being read.
#[derive(Default)]
struct EntryBuilder {
    title: String,
    summary: String,
    authors: Vec<String>,
    link: Option<String>,
}

impl EntryBuilder {
    fn finish(self) -> PaperRecord {
        let title = self.title.split_whitespace().collect::<Vec<_>>().join(" ");
        PaperRecord {
            title: (!title.is_empty()).then_some(title),
            authors: Some(self.authors.join(", ")),
            summary: Some(self.summary.trim().to_string()),
            source: Some(SOURCE_NAME.to_string()),
            url: Some(self.link.unwrap_or_default()),
        }
    }
}

/// Element whose text is being collected.
#[derive(Clone, Copy, PartialEq)]
enum Field {
    Title,
    Summary,
    AuthorName,
}

/// Take the entry URL from a `<link>` element: the first `rel="alternate"`
/// link, or a link without `rel`.
fn read_link(element: &BytesStart<'_>, entry: &mut EntryBuilder) -> ProviderResult<()> {
    if entry.link.is_some() {
        return Ok(());
    }

    let mut href = None;
    let mut rel = None;
    for attr in element.attributes() {
        let attr = attr.map_err(|e| ProviderError::ParseError(format!("Invalid link attribute: {}", e)))?;
        let value = attr
            .unescape_value()
            .map_err(|e| ProviderError::ParseError(e.to_string()))?
            .to_string();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"rel" => rel = Some(value),
            _ => {}
        }
    }

    if matches!(rel.as_deref(), None | Some("alternate")) {
        entry.link = href;
    }
    Ok(())
}

/// Parse an arXiv Atom feed into paper records, in feed order.
///
/// # Errors
/// Returns `ProviderError::ParseError` for malformed XML
pub fn parse_feed(body: &str) -> ProviderResult<Vec<PaperRecord>> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    let mut field: Option<Field> = None;
    let mut author_name = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ProviderError::ParseError(format!("Invalid arXiv feed at {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(element) => {
                let name = element.local_name();
                match name.as_ref() {
                    b"entry" => entry = Some(EntryBuilder::default()),
                    b"title" if entry.is_some() => field = Some(Field::Title),
                    b"summary" if entry.is_some() => field = Some(Field::Summary),
                    b"name" if entry.is_some() => {
                        author_name.clear();
                        field = Some(Field::AuthorName);
                    }
                    b"link" => {
                        if let Some(current) = entry.as_mut() {
                            read_link(&element, current)?;
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(element) => {
                if element.local_name().as_ref() == b"link" {
                    if let Some(current) = entry.as_mut() {
                        read_link(&element, current)?;
                    }
                }
            }
            Event::Text(text) => {
                let (Some(current), Some(field)) = (entry.as_mut(), field) else {
                    continue;
                };
                let text = text
                    .unescape()
                    .map_err(|e| ProviderError::ParseError(e.to_string()))?;
                match field {
                    Field::Title => current.title.push_str(&text),
                    Field::Summary => current.summary.push_str(&text),
                    Field::AuthorName => author_name.push_str(&text),
                }
            }
            Event::CData(data) => {
                if let (Some(current), Some(Field::Summary)) = (entry.as_mut(), field) {
                    current.summary.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(element) => match element.local_name().as_ref() {
                b"entry" => {
                    if let Some(done) = entry.take() {
                        papers.push(done.finish());
                    }
                    field = None;
                }
                b"name" => {
                    if let (Some(current), Some(Field::AuthorName)) = (entry.as_mut(), field) {
                        let name = author_name.trim();
                        if !name.is_empty() {
                            current.authors.push(name.to_string());
                        }
                    }
                    field = None;
                }
                b"title" | b"summary" => field = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(papers)
}

/// Searches arXiv through its Atom export API.
pub struct ArxivProvider {
    client: Client,
    query_url: String,
}

impl ArxivProvider {
    /// Create a provider.
    ///
    /// # Errors
    /// Returns `ProviderError::ConfigError` if the HTTP client cannot be built
    pub fn new(request_timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProviderError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            query_url: QUERY_URL.to_string(),
        })
    }

    /// Use a different query endpoint.
    pub fn with_query_url(mut self, url: impl Into<String>) -> Self {
        self.query_url = url.into();
        self
    }
}

#[async_trait]
impl PaperProvider for ArxivProvider {
    async fn search(&self, query: &str, max_results: usize) -> ProviderResult<Vec<PaperRecord>> {
        let search_query = format!("all:{}", query);
        let max = max_results.to_string();
        let response = self
            .client
            .get(&self.query_url)
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", max.as_str()),
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
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                Err(ProviderError::RateLimitExceeded(body))
            }
            s if !s.is_success() => Err(ProviderError::Other(format!("HTTP {}: {}", s, body))),
            _ => {
                let mut papers = parse_feed(&body)?;
                papers.truncate(max_results);
                debug!(count = papers.len(), "parsed arXiv feed");
                Ok(papers)
            }
        }
    }

    fn default_max_results(&self) -> usize {
        10
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}
