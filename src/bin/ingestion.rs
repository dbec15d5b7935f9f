//! Ingestion pipeline binary entry point.
//!
//! This binary runs the offline ingestion pipeline: it loads text documents,
//! splits them into overlapping chunks, embeds the chunks, and writes them to
//! the vector index.
//!
//! # Examples
//!
//! Initialize a new local index:
//! ```bash
//! ingestion --mode init-new --input data/papers --index-path data/index.json
//! ```
//!
//! Add documents to an existing index:
//! ```bash
//! ingestion --input data/new_papers
//! ```

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use paper_rag::{
    config::{IndexKind, RagConfig},
    embedding::{fastembed::FastEmbedProvider, EmbeddingProvider},
    index::{IndexBackend, VectorIndex},
    ingestion::{chunker::TextChunker, load_documents_from_directory, IngestionPipeline},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Operation mode for the ingestion pipeline
#[derive(Debug, Clone, ValueEnum)]
enum Mode {
    /// Connect to an existing index and validate its embedding config (default)
    Connect,
    /// Initialize a new index
    InitNew,
}

/// Index backend selection
#[derive(Debug, Clone, Copy, ValueEnum)]
enum IndexArg {
    /// Local JSON-backed index
    Memory,
    /// OpenSearch k-NN index
    Opensearch,
}

/// Ingestion pipeline CLI for building and updating the vector index
#[derive(Parser, Debug)]
#[command(
    name = "ingestion",
    version,
    about = "Build and update the paper vector index",
    long_about = "Ingestion pipeline that chunks research-paper text, generates embeddings, and writes them to a vector index.

EXAMPLES:
  Initialize a new local index:
    ingestion --mode init-new --input data/papers --index-path data/index.json

  Add documents to an existing index:
    ingestion --input data/new_papers

  Index into OpenSearch:
    ingestion --mode init-new --input data/papers --index opensearch --opensearch-url http://localhost:9200

  Custom chunking and logging:
    ingestion --input data/papers --chunk-size 800 --chunk-overlap 80 --log-level debug"
)]
struct IngestionArgs {
    /// Directory of .txt and .md files, searched recursively
    #[arg(short, long, value_name = "DIR")]
    input: PathBuf,

    /// Operation mode: connect to an existing index or initialize a new one
    #[arg(long, value_enum, default_value = "connect")]
    mode: Mode,

    /// Vector index backend (overrides PAPER_RAG_INDEX_BACKEND)
    #[arg(long, value_enum)]
    index: Option<IndexArg>,

    /// Local index file (overrides PAPER_RAG_INDEX_PATH)
    #[arg(long, value_name = "PATH")]
    index_path: Option<PathBuf>,

    /// OpenSearch URL (overrides OPENSEARCH_URL)
    #[arg(long, value_name = "URL")]
    opensearch_url: Option<String>,

    /// OpenSearch index name (overrides OPENSEARCH_INDEX)
    #[arg(long, value_name = "NAME")]
    opensearch_index: Option<String>,

    /// Maximum chunk length in characters
    #[arg(long, value_name = "N", default_value = "500")]
    chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, value_name = "N", default_value = "50")]
    chunk_overlap: usize,

    /// Number of chunks to embed per batch
    #[arg(long, value_name = "N", default_value = "100")]
    batch_size: usize,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Environment configuration with command-line overrides applied
fn load_config(args: &IngestionArgs) -> Result<RagConfig> {
    let mut config = RagConfig::from_env().context("Invalid environment configuration")?;

    if let Some(index) = args.index {
        config.index_kind = match index {
            IndexArg::Memory => IndexKind::Memory,
            IndexArg::Opensearch => IndexKind::OpenSearch,
        };
    }
    if let Some(path) = &args.index_path {
        config.index_path = path.clone();
    }
    if let Some(url) = &args.opensearch_url {
        config.opensearch_url = url.clone();
    }
    if let Some(name) = &args.opensearch_index {
        config.opensearch_index = name.clone();
    }
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    Ok(config)
}

/// Create the embedding provider
fn create_embedding_provider(config: &RagConfig) -> FastEmbedProvider {
    let cache_dir = config.cache_dir.clone().unwrap_or_else(|| {
        dirs::cache_dir()
            .map(|p| p.join("fastembed"))
            .unwrap_or_else(|| PathBuf::from(".cache/fastembed"))
    });
    debug!("Using cache directory: {}", cache_dir.display());

    let provider = FastEmbedProvider::new(None, Some(cache_dir));
    info!(
        "FastEmbed provider configured: model={}, dimension={}",
        provider.model_name(),
        provider.dimension()
    );
    provider
}

/// Create and initialize the ingestion pipeline based on mode
async fn create_pipeline(
    args: &IngestionArgs,
    embedding_provider: FastEmbedProvider,
    index: IndexBackend,
) -> Result<IngestionPipeline<FastEmbedProvider, IndexBackend>> {
    let batch_size = Some(args.batch_size);

    let pipeline = match args.mode {
        Mode::Connect => {
            info!("Connecting to existing index with config validation");
            IngestionPipeline::connect(embedding_provider, index, batch_size)
                .await
                .context("Failed to connect to existing index. Use --mode init-new to create a new index.")?
        }
        Mode::InitNew => {
            info!("Initializing new index");
            IngestionPipeline::initialize_new(embedding_provider, index, batch_size)
                .await
                .context("Failed to initialize new index")?
        }
    };

    let chunker = TextChunker::new(args.chunk_size, args.chunk_overlap)
        .map_err(anyhow::Error::msg)
        .context("Invalid chunking parameters")?;

    debug!(
        "Pipeline created with batch_size={}, chunk_size={}, chunk_overlap={}",
        pipeline.batch_size(),
        chunker.chunk_size(),
        chunker.chunk_overlap()
    );
    Ok(pipeline.with_chunker(chunker))
}

/// Create a progress bar for tracking ingestion
fn create_progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} chunks | Indexed: {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = IngestionArgs::parse();

    // Initialize logging
    init_logging(&args.log_level).context("Failed to initialize logging")?;

    info!("Starting document ingestion pipeline");
    debug!("CLI arguments: {:?}", args);

    let start_time = Instant::now();

    // Validate input directory exists
    if !args.input.is_dir() {
        error!("Input directory does not exist: {:?}", args.input);
        anyhow::bail!("Input directory not found: {:?}", args.input);
    }
    info!("Input directory: {:?}", args.input);

    let config = load_config(&args)?;

    // Open index
    let index = IndexBackend::from_config(&config)
        .await
        .context("Failed to open vector index")?;
    info!("Index backend: {}", index.name());

    // Create pipeline
    let embedding_provider = create_embedding_provider(&config);
    let pipeline = create_pipeline(&args, embedding_provider, index)
        .await
        .context("Failed to create ingestion pipeline")?;

    // Load and chunk documents
    let documents = load_documents_from_directory(&args.input)
        .with_context(|| format!("Failed to load documents from {:?}", args.input))?;
    info!("Found {} documents", documents.len());

    if documents.is_empty() {
        warn!("No .txt or .md files found in input directory");
        return Ok(());
    }

    // Embed and index in batches
    let progress = create_progress_bar()?;
    progress.set_message("0");

    info!("Processing chunks with batch_size={}...", pipeline.batch_size());
    let stats = pipeline
        .ingest_documents_with_progress(&documents, |stats| {
            progress.set_length(stats.chunks as u64);
            progress.set_position((stats.indexed + stats.failed) as u64);
            progress.set_message(format!("{}", stats.indexed));
        })
        .await
        .context("Failed to ingest documents")?;

    progress.finish_with_message(format!("{}", stats.indexed));
    info!("Split {} documents into {} chunks", stats.documents, stats.chunks);

    let total = pipeline.index().count().await.context("Failed to count indexed passages")?;

    // Display final statistics
    let elapsed = start_time.elapsed();
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Ingestion Completed               ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Documents:            {:>16} ║", stats.documents);
    println!("║ Chunks:               {:>16} ║", stats.chunks);
    println!("║ Indexed:              {:>16} ║", stats.indexed);
    println!("║ Failed:               {:>16} ║", stats.failed);
    println!("║ Passages in index:    {:>16} ║", total);
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");

    if stats.failed > 0 {
        warn!("{} chunks failed to index - check logs for details", stats.failed);
    }

    info!("Ingestion pipeline completed successfully");

    Ok(())
}
