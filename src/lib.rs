//! Paper RAG - a research-paper assistant built on two-stage retrieval.
//!
//! This library provides the core functionality for answering questions about
//! research papers: a vector index is searched for candidate passages, a
//! cross-encoder reranks them, and the best few become the context for a
//! language-model answer.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (PaperRecord, CandidatePassage, RankedPassage)
//! - **embedding**: Text embedding generation and normalization
//! - **index**: Vector index backends (local JSON-backed, OpenSearch)
//! - **retrieval**: First-stage vector search with deadline and retry
//! - **rerank**: Cross-encoder reranking with a stable tie-break
//! - **pipeline**: Retrieve-and-rerank assembly into paper records
//! - **generation**: Answer and summary generation (Gemini)
//! - **assistant**: Question answering over the pipeline
//! - **provider**: External paper search (Semantic Scholar, CORE)
//! - **ingestion**: Offline chunking and indexing of documents
//! - **config**: Environment-driven runtime configuration
//!
//! # Workflow
//!
//! ## Offline Ingestion
//!
//! 1. Load `.txt`/`.md` documents from a directory
//! 2. Split them into overlapping chunks
//! 3. Embed each chunk
//! 4. Write chunks and embeddings to the vector index
//!
//! ## Online Question Answering
//!
//! 1. Normalize and embed the question
//! 2. Retrieve the top N (15) candidate passages from the index
//! 3. Rerank them with a cross-encoder and keep the top K (5)
//! 4. Render the survivors as context and generate an answer
//!
//! # Example
//!
//! ```ignore
//! use paper_rag::{assistant::DefaultAssistant, config::RagConfig, generation::ChatSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RagConfig::from_env()?;
//!     let assistant = DefaultAssistant::from_config(&config).await?;
//!
//!     let mut session = ChatSession::new();
//!     let answer = assistant.ask("How do graph neural networks aggregate features?", &mut session).await?;
//!     println!("{}", answer.text);
//!     for paper in &answer.papers {
//!         println!("- {}", paper.display_title());
//!     }
//!     Ok(())
//! }
//! ```

// Public modules
pub mod assistant;
pub mod config;
pub mod embedding;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod lazy;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod rerank;
pub mod retrieval;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types at the crate root
pub use config::RagConfig;
pub use embedding::EmbeddingProvider;
pub use index::{EmbeddingConfig, VectorIndex};
pub use models::{CandidatePassage, PaperRecord, PassageMetadata, RankedPassage};
pub use pipeline::RetrievePipeline;
pub use rerank::CrossEncoder;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
