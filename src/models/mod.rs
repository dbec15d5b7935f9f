//! Core data models for the paper assistant.
//!
//! This module contains the records that flow through retrieval and answer
//! generation: paper records handed to callers, candidate passages emitted by
//! the vector index, and the ranked passages produced by the reranker.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::embedding::normalize_text;

/// Placeholder title for records whose source had none.
pub const UNTITLED: &str = "Untitled";

/// Placeholder author string for records whose source had none.
pub const UNKNOWN_AUTHORS: &str = "Unknown";

/// Source tag used for records assembled from the vector index.
pub const VECTOR_DB_SOURCE: &str = "VectorDB";

/// A research paper as seen by the rest of the application.
///
/// Every field is optional: external sources routinely omit titles or
/// abstracts. Records are built once and never mutated; two records are
/// considered the same paper when their normalized titles match.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaperRecord {
    /// Paper title
    pub title: Option<String>,

    /// Comma-separated author names
    pub authors: Option<String>,

    /// Abstract, summary, or retrieved passage text
    pub summary: Option<String>,

    /// Where the record came from (e.g. "Semantic Scholar", "VectorDB")
    pub source: Option<String>,

    /// Landing page or PDF link
    pub url: Option<String>,
}

impl PaperRecord {
    /// Title for display, falling back to [`UNTITLED`].
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNTITLED)
    }

    /// Authors for display, falling back to [`UNKNOWN_AUTHORS`].
    pub fn display_authors(&self) -> &str {
        self.authors.as_deref().unwrap_or(UNKNOWN_AUTHORS)
    }

    /// Summary text, empty when absent.
    pub fn summary_text(&self) -> &str {
        self.summary.as_deref().unwrap_or("")
    }

    /// Deduplication key: the normalized title, if the record has one.
    pub fn dedup_key(&self) -> Option<String> {
        self.title
            .as_deref()
            .map(normalize_title)
            .filter(|key| !key.is_empty())
    }
}

/// Provenance metadata stored alongside each indexed passage.
///
/// Keys mirror what the vector index stores: `title`, `authors`, `url`,
/// `source`. Any of them may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A passage returned by one retrieval call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidatePassage {
    /// Passage text
    pub text: String,

    /// Provenance metadata
    pub metadata: PassageMetadata,

    /// 0-based position in the retrieval output
    pub retrieval_rank: usize,

    /// Vector similarity reported by the index
    pub similarity: f32,
}

/// A candidate that survived reranking, with its cross-encoder score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedPassage {
    pub passage: CandidatePassage,

    /// Cross-encoder relevance score (higher is better)
    pub score: f32,
}

impl RankedPassage {
    /// Map this passage into a paper record, defaulting missing metadata.
    pub fn to_paper_record(&self) -> PaperRecord {
        let meta = &self.passage.metadata;
        PaperRecord {
            title: Some(meta.title.clone().unwrap_or_else(|| UNTITLED.to_string())),
            authors: Some(
                meta.authors
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_AUTHORS.to_string()),
            ),
            summary: Some(self.passage.text.clone()),
            source: Some(
                meta.source
                    .clone()
                    .unwrap_or_else(|| VECTOR_DB_SOURCE.to_string()),
            ),
            url: Some(meta.url.clone().unwrap_or_default()),
        }
    }
}

/// Normalize a title for duplicate detection.
pub fn normalize_title(title: &str) -> String {
    normalize_text(title)
}

/// Remove papers whose normalized title was already seen, keeping the first.
///
/// Records without a usable title are always kept: there is nothing to
/// compare them by.
pub fn deduplicate_papers(papers: Vec<PaperRecord>) -> Vec<PaperRecord> {
    let mut seen = HashSet::new();
    papers
        .into_iter()
        .filter(|paper| match paper.dedup_key() {
            Some(key) => seen.insert(key),
            None => true,
        })
        .collect()
}
