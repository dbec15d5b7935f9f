//! Retrieval-augmented question answering.
//!
//! [`RagAssistant`] runs the retrieve-and-rerank pipeline for a question,
//! renders the surviving papers as context, and asks the text generator for
//! an answer that takes the chat history into account.

use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, RagConfig};
use crate::embedding::fastembed::FastEmbedProvider;
use crate::embedding::EmbeddingProvider;
use crate::generation::gemini::GeminiGenerator;
use crate::generation::{build_context, AnswerService, ChatSession, GenerationError, TextGenerator};
use crate::index::{IndexBackend, IndexError, VectorIndex};
use crate::models::PaperRecord;
use crate::pipeline::{PipelineError, RetrievePipeline};
use crate::rerank::fastembed::FastEmbedCrossEncoder;
use crate::rerank::{CrossEncoder, Reranker};
use crate::retrieval::{RetrievalOptions, VectorRetriever};

/// Errors that can occur while answering a question.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Result type for assistant operations.
pub type AssistantResult<T> = Result<T, AssistantError>;

/// An answer and the papers it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub papers: Vec<PaperRecord>,
}

/// Pipeline plus answer generator.
pub struct RagAssistant<E, I, C, G>
where
    E: EmbeddingProvider,
    I: VectorIndex,
    C: CrossEncoder,
    G: TextGenerator,
{
    pipeline: RetrievePipeline<E, I, C>,
    answers: AnswerService<G>,
}

/// The assistant wired with local fastembed models and Gemini.
pub type DefaultAssistant = RagAssistant<FastEmbedProvider, IndexBackend, FastEmbedCrossEncoder, GeminiGenerator>;

impl<E, I, C, G> RagAssistant<E, I, C, G>
where
    E: EmbeddingProvider,
    I: VectorIndex,
    C: CrossEncoder,
    G: TextGenerator,
{
    pub fn new(pipeline: RetrievePipeline<E, I, C>, generator: G) -> Self {
        Self {
            pipeline,
            answers: AnswerService::new(generator),
        }
    }

    pub fn pipeline(&self) -> &RetrievePipeline<E, I, C> {
        &self.pipeline
    }

    pub fn answers(&self) -> &AnswerService<G> {
        &self.answers
    }

    /// Answer `question` from the papers the pipeline retrieves for it.
    ///
    /// The exchange is appended to `session`.
    pub async fn ask(&self, question: &str, session: &mut ChatSession) -> AssistantResult<Answer> {
        let papers = self.pipeline.retrieve_and_rerank(question).await?;
        info!(papers = papers.len(), history = session.len(), "answering question");

        let context = build_context(&papers);
        let text = self.answers.answer(question, &context, session).await?;
        Ok(Answer { text, papers })
    }
}

/// Build the retrieve-and-rerank pipeline from configuration.
///
/// Models are not loaded until the first query.
pub async fn build_pipeline(
    config: &RagConfig,
) -> AssistantResult<RetrievePipeline<FastEmbedProvider, IndexBackend, FastEmbedCrossEncoder>> {
    let index = IndexBackend::from_config(config).await?;
    let embedder = FastEmbedProvider::new(None, config.cache_dir.clone());
    let retriever = VectorRetriever::with_options(
        embedder,
        index,
        RetrievalOptions {
            deadline: Some(config.timeout()),
            retry_backoff: config.retry_backoff(),
            max_retries: 1,
        },
    );
    let reranker = Reranker::new(FastEmbedCrossEncoder::new(None, config.cache_dir.clone()))
        .with_deadline(config.timeout());

    Ok(RetrievePipeline::new(retriever, reranker, config.retrieve_n, config.keep_k))
}

/// Build the Gemini generator from configuration.
pub fn build_generator(config: &RagConfig) -> AssistantResult<GeminiGenerator> {
    let api_key = config.require_gemini_key()?;
    Ok(GeminiGenerator::new(
        api_key,
        Some(config.gemini_model.clone()),
        config.timeout(),
    )?)
}

impl DefaultAssistant {
    /// Assemble the full assistant from configuration.
    ///
    /// # Errors
    /// Fails if the Gemini key is missing or the index cannot be opened
    pub async fn from_config(config: &RagConfig) -> AssistantResult<Self> {
        let generator = build_generator(config)?;
        let pipeline = build_pipeline(config).await?;
        Ok(Self::new(pipeline, generator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::generation::tests::CannedGenerator;
    use crate::rerank::tests::TableEncoder;
    use crate::testing::{MockEmbeddingProvider, ScriptedIndex};

    fn assistant(
        index: ScriptedIndex,
        generator: CannedGenerator,
    ) -> RagAssistant<MockEmbeddingProvider, ScriptedIndex, TableEncoder, CannedGenerator> {
        let retriever = VectorRetriever::with_options(
            MockEmbeddingProvider::new(8),
            index,
            RetrievalOptions {
                deadline: Some(Duration::from_secs(5)),
                retry_backoff: Duration::from_millis(1),
                max_retries: 1,
            },
        );
        let encoder = TableEncoder::new(&[("message passing", 2.0), ("attention", 1.0)]);
        RagAssistant::new(RetrievePipeline::new(retriever, Reranker::new(encoder), 15, 5), generator)
    }

    #[tokio::test]
    async fn test_ask_grounds_prompt_in_reranked_papers() {
        let generator = CannedGenerator::new(" GNNs pass messages. ");
        let assistant = assistant(
            ScriptedIndex::with_texts(&["attention", "message passing"]),
            generator.clone(),
        );
        let mut session = ChatSession::new();

        let answer = assistant.ask("how do gnns work", &mut session).await.unwrap();
        assert_eq!(answer.text, "GNNs pass messages.");
        assert_eq!(answer.papers.len(), 2);
        assert_eq!(answer.papers[0].summary_text(), "message passing");

        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("Paper 1\nmessage passing\n\nPaper 0\nattention"));
        assert!(prompt.contains("User: how do gnns work\nAI:"));
        assert_eq!(session.len(), 1);
    }

    #[tokio::test]
    async fn test_index_failure_skips_generation() {
        let generator = CannedGenerator::new("unused");
        let assistant = assistant(ScriptedIndex::with_texts(&["a"]).failing(5), generator.clone());
        let mut session = ChatSession::new();

        let result = assistant.ask("q", &mut session).await;
        assert!(matches!(
            result,
            Err(AssistantError::Pipeline(PipelineError::IndexUnavailable(_)))
        ));
        assert!(generator.prompts().is_empty());
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_from_config_requires_gemini_key() {
        let config = RagConfig::default();
        assert!(matches!(
            DefaultAssistant::from_config(&config).await,
            Err(AssistantError::Config(_))
        ));
    }
}
