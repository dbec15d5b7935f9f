//! Google Gemini text generation.
//!
//! Calls the `generateContent` endpoint of the Generative Language API with
//! a single user turn and returns the concatenated text parts of the first
//! candidate. The API key travels in the `x-goog-api-key` header so it
//! never appears in URLs or error messages.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerationError, GenerationResult, TextGenerator};

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Generative Language API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    code: i32,
    message: String,
}

/// Gemini-backed text generator.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiGenerator {
    /// Create a generator for `model` (defaults to [`DEFAULT_MODEL`]).
    ///
    /// # Errors
    /// Returns `GenerationError::ConfigError` for an empty API key or if the
    /// HTTP client cannot be built
    pub fn new(
        api_key: impl Into<String>,
        model: Option<String>,
        request_timeout: Duration,
    ) -> GenerationResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GenerationError::ConfigError("Gemini API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GenerationError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Point the generator at a different API base (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

fn request_body(prompt: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: Some(prompt.to_string()),
            }],
            role: Some("user".to_string()),
        }],
    }
}

fn parse_response(body: &str) -> GenerationResult<String> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

    let candidate = response
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| GenerationError::InvalidResponse("Response contained no candidates".to_string()))?;

    Ok(candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default())
}

fn parse_error(status: reqwest::StatusCode, body: &str) -> GenerationError {
    match serde_json::from_str::<GeminiErrorResponse>(body) {
        Ok(error) => GenerationError::ApiError(format!(
            "Gemini API error ({}): {}",
            error.error.code, error.error.message
        )),
        Err(_) => GenerationError::ApiError(format!("Gemini API error ({}): {}", status, body)),
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> GenerationResult<String> {
        let response = self
            .client
            .post(self.url())
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&request_body(prompt))
            .send()
            .await
            .map_err(|e| GenerationError::NetworkError(format!("Request failed: {}", e.without_url())))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| {
                GenerationError::NetworkError(format!("Failed to read response: {}", e.without_url()))
            })?;

        if !status.is_success() {
            return Err(parse_error(status, &text));
        }
        parse_response(&text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
