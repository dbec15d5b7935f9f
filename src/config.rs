//! Runtime configuration.
//!
//! Settings come from environment variables with the defaults below; the
//! binaries layer command-line flags on top.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PAPER_RAG_INDEX_BACKEND` | `memory` |
//! | `PAPER_RAG_INDEX_PATH` | `data/index.json` |
//! | `OPENSEARCH_URL` | `http://localhost:9200` |
//! | `OPENSEARCH_INDEX` | `research-papers` |
//! | `PAPER_RAG_RETRIEVE_N` | `15` |
//! | `PAPER_RAG_KEEP_K` | `5` |
//! | `PAPER_RAG_TIMEOUT_SECS` | `30` |
//! | `PAPER_RAG_RETRY_BACKOFF_MS` | `500` |
//! | `GEMINI_API_KEY` / `GOOGLE_API_KEY` | unset |
//! | `GEMINI_MODEL` | `gemini-2.5-pro` |
//! | `FASTEMBED_CACHE_DIR` | unset |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generation::gemini::DEFAULT_MODEL;
use crate::index::opensearch::{DEFAULT_INDEX, DEFAULT_URL};

/// Default number of candidates fetched from the index.
pub const DEFAULT_RETRIEVE_N: usize = 15;

/// Default number of candidates kept after reranking.
pub const DEFAULT_KEEP_K: usize = 5;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// A required setting is missing
    #[error("Missing configuration: {0}")]
    Missing(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which vector index implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Local brute-force index persisted to a JSON file
    Memory,
    /// Remote OpenSearch k-NN index
    OpenSearch,
}

impl FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "local" => Ok(IndexKind::Memory),
            "opensearch" => Ok(IndexKind::OpenSearch),
            other => Err(format!("unknown index backend '{}'", other)),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub index_kind: IndexKind,

    /// File backing the in-memory index
    pub index_path: PathBuf,

    pub opensearch_url: String,
    pub opensearch_index: String,

    /// Candidates requested from the index (N)
    pub retrieve_n: usize,

    /// Candidates kept after reranking (K)
    pub keep_k: usize,

    /// Deadline for each index call and for the reranking step
    pub timeout_secs: u64,

    /// Wait before the single retry of an unavailable index
    pub retry_backoff_ms: u64,

    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,

    /// FastEmbed model cache directory
    pub cache_dir: Option<PathBuf>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            index_kind: IndexKind::Memory,
            index_path: PathBuf::from("data/index.json"),
            opensearch_url: DEFAULT_URL.to_string(),
            opensearch_index: DEFAULT_INDEX.to_string(),
            retrieve_n: DEFAULT_RETRIEVE_N,
            keep_k: DEFAULT_KEEP_K,
            timeout_secs: 30,
            retry_backoff_ms: 500,
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            cache_dir: None,
        }
    }
}

impl RagConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PAPER_RAG_INDEX_BACKEND") {
            config.index_kind = v.parse().map_err(|message| ConfigError::InvalidValue {
                key: "PAPER_RAG_INDEX_BACKEND".to_string(),
                message,
            })?;
        }
        if let Some(v) = get("PAPER_RAG_INDEX_PATH") {
            config.index_path = PathBuf::from(v);
        }
        if let Some(v) = get("OPENSEARCH_URL") {
            config.opensearch_url = v;
        }
        if let Some(v) = get("OPENSEARCH_INDEX") {
            config.opensearch_index = v;
        }
        if let Some(v) = get("PAPER_RAG_RETRIEVE_N") {
            config.retrieve_n = parse_positive("PAPER_RAG_RETRIEVE_N", &v)?;
        }
        if let Some(v) = get("PAPER_RAG_KEEP_K") {
            config.keep_k = parse_positive("PAPER_RAG_KEEP_K", &v)?;
        }
        if let Some(v) = get("PAPER_RAG_TIMEOUT_SECS") {
            config.timeout_secs = parse_positive("PAPER_RAG_TIMEOUT_SECS", &v)? as u64;
        }
        if let Some(v) = get("PAPER_RAG_RETRY_BACKOFF_MS") {
            config.retry_backoff_ms = v.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "PAPER_RAG_RETRY_BACKOFF_MS".to_string(),
                message: format!("{}", e),
            })?;
        }
        config.gemini_api_key = get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY"));
        if let Some(v) = get("GEMINI_MODEL") {
            config.gemini_model = v;
        }
        config.cache_dir = get("FASTEMBED_CACHE_DIR").map(PathBuf::from);

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// The Gemini API key, or an error naming the variables to set.
    pub fn require_gemini_key(&self) -> ConfigResult<&str> {
        self.gemini_api_key.as_deref().ok_or_else(|| {
            ConfigError::Missing("GEMINI_API_KEY (or GOOGLE_API_KEY) must be set".to_string())
        })
    }
}

fn parse_positive(key: &str, value: &str) -> ConfigResult<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RagConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.retrieve_n, 15);
        assert_eq!(config.keep_k, 5);
        assert_eq!(config.index_kind, IndexKind::Memory);
        assert_eq!(config.opensearch_index, "research-papers");
        assert_eq!(config.gemini_model, "gemini-2.5-pro");
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = RagConfig::from_lookup(lookup(&[
            ("PAPER_RAG_INDEX_BACKEND", "OpenSearch"),
            ("PAPER_RAG_RETRIEVE_N", "30"),
            ("PAPER_RAG_KEEP_K", "3"),
            ("PAPER_RAG_TIMEOUT_SECS", "5"),
            ("GOOGLE_API_KEY", "g-key"),
        ]))
        .unwrap();
        assert_eq!(config.index_kind, IndexKind::OpenSearch);
        assert_eq!(config.retrieve_n, 30);
        assert_eq!(config.keep_k, 3);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.require_gemini_key().unwrap(), "g-key");
    }

    #[test]
    fn test_gemini_key_takes_precedence() {
        let config = RagConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "primary"),
            ("GOOGLE_API_KEY", "fallback"),
        ]))
        .unwrap();
        assert_eq!(config.gemini_api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RagConfig::from_lookup(lookup(&[("PAPER_RAG_KEEP_K", "0")])).is_err());
        assert!(RagConfig::from_lookup(lookup(&[("PAPER_RAG_RETRIEVE_N", "many")])).is_err());
        assert!(RagConfig::from_lookup(lookup(&[("PAPER_RAG_INDEX_BACKEND", "faiss")])).is_err());
    }

    #[test]
    fn test_missing_gemini_key() {
        let config = RagConfig::default();
        assert!(matches!(config.require_gemini_key(), Err(ConfigError::Missing(_))));
    }
}
