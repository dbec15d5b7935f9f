//! Answer generation and summarization.
//!
//! The [`TextGenerator`] trait is the boundary to the language model: a
//! prompt goes in, text comes out. [`AnswerService`] builds prompts from
//! retrieved papers and chat history, and summarizes paper abstracts.

pub mod gemini;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::PaperRecord;

/// Returned by [`AnswerService::summarize`] for blank input.
pub const EMPTY_SUMMARY: &str = "No content to summarize.";

const ANSWER_PREAMBLE: &str =
    "You are an AI assistant helping the user understand research papers.";

const SUMMARY_INSTRUCTION: &str = "Please summarize the following academic abstract bullet points. \
Avoid repetition, use clear language, and extract key ideas only:";

/// Errors that can occur during text generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// API request failed
    #[error("API error: {0}")]
    ApiError(String),

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Missing API key or similar
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for generation operations.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Trait for text generation backends.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`. One call, no streaming.
    async fn generate(&self, prompt: &str) -> GenerationResult<String>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}

/// One question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user: String,
    pub ai: String,
}

/// Conversation history for one chat.
///
/// Owned by the caller and passed in per request; nothing is shared between
/// sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSession {
    turns: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, user: impl Into<String>, ai: impl Into<String>) {
        self.turns.push(ChatTurn {
            user: user.into(),
            ai: ai.into(),
        });
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// History rendered as `User: ...\nAI: ...` lines.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("User: {}\nAI: {}", turn.user, turn.ai))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Render papers as a context block: title then summary, blank line between
/// papers, order preserved.
pub fn build_context(papers: &[PaperRecord]) -> String {
    papers
        .iter()
        .map(|paper| format!("{}\n{}", paper.title.as_deref().unwrap_or(""), paper.summary_text()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Assemble the answer prompt from context, history, and the new question.
pub fn build_answer_prompt(question: &str, context: &str, session: &ChatSession) -> String {
    format!(
        "{preamble}\nContext from retrieved papers:\n{context}\n\nConversation so far:\n{history}\n\nUser: {question}\nAI:\n",
        preamble = ANSWER_PREAMBLE,
        context = context,
        history = session.transcript(),
        question = question,
    )
}

/// Build the summarization prompt for `text`.
pub fn build_summary_prompt(text: &str) -> String {
    format!("{}\n\n{}", SUMMARY_INSTRUCTION, text)
}

/// Generates answers and summaries with a text generator.
pub struct AnswerService<G: TextGenerator> {
    generator: G,
}

impl<G: TextGenerator> AnswerService<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Answer `question` from `context`, recording the exchange in `session`.
    ///
    /// The answer is trimmed before it is returned and recorded. On error the
    /// session is left unchanged.
    pub async fn answer(
        &self,
        question: &str,
        context: &str,
        session: &mut ChatSession,
    ) -> GenerationResult<String> {
        let prompt = build_answer_prompt(question, context, session);
        debug!(
            model = self.generator.model_name(),
            prompt_chars = prompt.len(),
            history = session.len(),
            "generating answer"
        );

        let answer = self.generator.generate(&prompt).await?.trim().to_string();
        session.push(question, answer.clone());
        Ok(answer)
    }

    /// Summarize `text`. Blank input returns [`EMPTY_SUMMARY`] without
    /// calling the model.
    pub async fn summarize(&self, text: &str) -> GenerationResult<String> {
        if text.trim().is_empty() {
            return Ok(EMPTY_SUMMARY.to_string());
        }
        self.generator.generate(&build_summary_prompt(text)).await
    }

    /// Summarize every paper concurrently, in input order.
    ///
    /// Each paper is summarized from its summary, else its title. A failed
    /// summary is replaced by an error message rather than failing the batch.
    pub async fn summarize_all(&self, papers: &[PaperRecord]) -> Vec<String> {
        let tasks = papers.iter().map(|paper| {
            let text = paper
                .summary
                .as_deref()
                .filter(|s| !s.is_empty())
                .or(paper.title.as_deref().filter(|t| !t.is_empty()))
                .unwrap_or("No content");
            async move {
                match self.summarize(text).await {
                    Ok(summary) => summary,
                    Err(e) => {
                        warn!(error = %e, "summarization failed");
                        format!("Error during summarization: {}", e)
                    }
                }
            }
        });
        join_all(tasks).await
    }
}
