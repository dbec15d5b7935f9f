//! Assistant binary entry point.
//!
//! Command-line front end for the paper assistant: retrieve and rerank
//! passages, ask one-off questions, chat interactively, or fetch and
//! summarize papers from external sources.
//!
//! # Examples
//!
//! Retrieve and rerank:
//! ```bash
//! assistant search --query "graph neural networks"
//! ```
//!
//! Ask a question (needs GEMINI_API_KEY):
//! ```bash
//! assistant ask --query "How do GNNs aggregate neighbor features?"
//! ```
//!
//! Interactive chat:
//! ```bash
//! assistant chat
//! ```
//!
//! Fetch papers from arXiv, Semantic Scholar and CORE:
//! ```bash
//! assistant fetch --query "federated learning" --summarize
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use paper_rag::{
    assistant::{build_generator, build_pipeline, DefaultAssistant},
    config::{IndexKind, RagConfig},
    generation::{AnswerService, ChatSession},
    models::{PaperRecord, RankedPassage},
    provider::{
        arxiv::ArxivProvider, core_ac::CoreProvider, fetch_papers,
        semantic_scholar::SemanticScholarProvider, PaperProvider,
    },
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::Serialize;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Index backend selection
#[derive(Debug, Clone, Copy, ValueEnum)]
enum IndexArg {
    /// Local JSON-backed index
    Memory,
    /// OpenSearch k-NN index
    Opensearch,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Retrieve and rerank passages for a query
    Search {
        #[arg(long, short, value_name = "TEXT")]
        query: String,
    },
    /// Answer a single question from the indexed papers
    Ask {
        #[arg(long, short, value_name = "TEXT")]
        query: String,
    },
    /// Interactive chat over the indexed papers
    Chat,
    /// Search arXiv, Semantic Scholar and CORE
    Fetch {
        #[arg(long, short, value_name = "TEXT")]
        query: String,

        /// Summarize each paper with the language model
        #[arg(long)]
        summarize: bool,
    },
}

/// Research-paper assistant CLI
#[derive(Parser, Debug)]
#[command(
    name = "assistant",
    version,
    about = "Retrieve, rerank, and answer questions about research papers",
    long_about = "Research-paper assistant. Retrieves candidate passages from a vector index, \
                  reranks them with a cross-encoder, and answers questions with Gemini.

EXAMPLES:
  Retrieve and rerank:
    assistant search --query \"graph neural networks\"

  Ask with an OpenSearch index:
    assistant --index opensearch ask --query \"What is message passing?\"

  Chat:
    GEMINI_API_KEY=... assistant chat

  Fetch and summarize external papers:
    assistant fetch --query \"federated learning\" --summarize"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Vector index backend (overrides PAPER_RAG_INDEX_BACKEND)
    #[arg(long, value_enum, global = true)]
    index: Option<IndexArg>,

    /// Local index file (overrides PAPER_RAG_INDEX_PATH)
    #[arg(long, value_name = "PATH", global = true)]
    index_path: Option<PathBuf>,

    /// OpenSearch URL (overrides OPENSEARCH_URL)
    #[arg(long, value_name = "URL", global = true)]
    opensearch_url: Option<String>,

    /// Candidates retrieved before reranking
    #[arg(long, value_name = "N", global = true)]
    top_n: Option<usize>,

    /// Candidates kept after reranking
    #[arg(long, value_name = "K", global = true)]
    top_k: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL", global = true)]
    log_level: String,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR", global = true)]
    cache_dir: Option<PathBuf>,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// Environment configuration with command-line overrides applied
fn load_config(args: &Args) -> Result<RagConfig> {
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
    if let Some(n) = args.top_n.filter(|&n| n > 0) {
        config.retrieve_n = n;
    }
    if let Some(k) = args.top_k.filter(|&k| k > 0) {
        config.keep_k = k;
    }
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    if config.cache_dir.is_none() {
        config.cache_dir = dirs::cache_dir().map(|p| p.join("fastembed"));
    }

    debug!(
        index_path = %config.index_path.display(),
        opensearch_url = %config.opensearch_url,
        gemini_model = %config.gemini_model,
        "resolved configuration"
    );
    Ok(config)
}

/// Shorten `text` to at most `max` characters.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(*h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

#[derive(Serialize)]
struct RankedOutput {
    rank: usize,
    retrieval_rank: usize,
    score: f32,
    paper: PaperRecord,
}

/// Format reranked passages as a table
fn format_ranked_table(ranked: &[RankedPassage]) -> String {
    if ranked.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = new_table(&["Rank", "Title", "Authors", "Source", "Score", "Retrieved"]);
    for (idx, item) in ranked.iter().enumerate() {
        let paper = item.to_paper_record();
        let score_cell = if item.score == paper_rag::rerank::SENTINEL_SCORE {
            Cell::new("n/a").fg(Color::Red)
        } else {
            Cell::new(format!("{:.4}", item.score))
        };
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(truncate(paper.display_title(), 60)),
            Cell::new(truncate(paper.display_authors(), 40)),
            Cell::new(paper.source.as_deref().unwrap_or("N/A")),
            score_cell,
            Cell::new(format!("#{}", item.passage.retrieval_rank + 1)),
        ]);
    }
    table.to_string()
}

/// Format paper records, optionally with summaries, as a table
fn format_papers_table(papers: &[PaperRecord], summaries: Option<&[String]>) -> String {
    if papers.is_empty() {
        return "No papers found.".to_string();
    }

    let mut headers = vec!["#", "Title", "Authors", "Source", "URL"];
    if summaries.is_some() {
        headers.push("Summary");
    }

    let mut table = new_table(&headers);
    for (idx, paper) in papers.iter().enumerate() {
        let mut row = vec![
            Cell::new(idx + 1),
            Cell::new(truncate(paper.display_title(), 60)),
            Cell::new(truncate(paper.display_authors(), 40)),
            Cell::new(paper.source.as_deref().unwrap_or("N/A")),
            Cell::new(paper.url.as_deref().unwrap_or("")),
        ];
        if let Some(summary) = summaries.and_then(|s| s.get(idx)) {
            row.push(Cell::new(truncate(summary, 300)));
        }
        table.add_row(row);
    }
    table.to_string()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize results to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Display the full text of one paper
fn display_paper_detail(paper: &PaperRecord, rank: usize) {
    println!("\n{}", "═".repeat(80));
    println!("Rank: {}", rank);
    println!("Title: {}", paper.display_title());
    println!("Authors: {}", paper.display_authors());
    println!("Source: {}", paper.source.as_deref().unwrap_or("N/A"));
    if let Some(url) = paper.url.as_deref().filter(|u| !u.is_empty()) {
        println!("URL: {}", url);
    }
    println!("\n{}", paper.summary_text());
    println!("{}", "═".repeat(80));
}

async fn run_search(config: &RagConfig, query: &str, format: OutputFormat) -> Result<()> {
    let pipeline = build_pipeline(config).await.context("Failed to build retrieval pipeline")?;

    let start = Instant::now();
    let run = pipeline
        .rank(query)
        .await
        .with_context(|| format!("Failed to search for query: '{}'", query))?;
    let elapsed = start.elapsed();

    match format {
        OutputFormat::Table => {
            println!("{}", format_ranked_table(&run.ranked));
            println!(
                "\nReranked {} of {} candidates in {:.2}s",
                run.ranked.len(),
                run.retrieved.len(),
                elapsed.as_secs_f64()
            );
        }
        OutputFormat::Json => {
            let output: Vec<RankedOutput> = run
                .ranked
                .iter()
                .enumerate()
                .map(|(idx, item)| RankedOutput {
                    rank: idx + 1,
                    retrieval_rank: item.passage.retrieval_rank,
                    score: item.score,
                    paper: item.to_paper_record(),
                })
                .collect();
            print_json(&output)?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct AnswerOutput<'a> {
    question: &'a str,
    answer: &'a str,
    papers: &'a [PaperRecord],
}

async fn run_ask(config: &RagConfig, query: &str, format: OutputFormat) -> Result<()> {
    let assistant = DefaultAssistant::from_config(config)
        .await
        .context("Failed to set up assistant")?;

    let mut session = ChatSession::new();
    let answer = assistant
        .ask(query, &mut session)
        .await
        .with_context(|| format!("Failed to answer: '{}'", query))?;

    match format {
        OutputFormat::Table => {
            println!("{}\n", answer.text);
            println!("Sources:\n{}", format_papers_table(&answer.papers, None));
        }
        OutputFormat::Json => print_json(&AnswerOutput {
            question: query,
            answer: &answer.text,
            papers: &answer.papers,
        })?,
    }
    Ok(())
}

fn print_chat_help() {
    println!("Commands:");
    println!("  <question>      - Ask about the indexed papers");
    println!("  /papers         - Show the papers behind the last answer");
    println!("  /detail N       - Show full text of paper N");
    println!("  /history        - Show the conversation so far");
    println!("  /clear          - Start a new conversation");
    println!("  /help           - Show this help");
    println!("  Ctrl+D or Ctrl+C - Exit");
}

/// Run interactive chat mode
async fn run_chat(config: &RagConfig) -> Result<()> {
    let assistant = DefaultAssistant::from_config(config)
        .await
        .context("Failed to set up assistant")?;

    println!("Research Paper Chat");
    print_chat_help();
    println!();

    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;
    let mut session = ChatSession::new();
    let mut last_papers: Vec<PaperRecord> = Vec::new();

    loop {
        match rl.readline("You> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    match parts[0] {
                        "/help" => print_chat_help(),
                        "/papers" => println!("{}", format_papers_table(&last_papers, None)),
                        "/detail" => match parts.get(1).and_then(|n| n.parse::<usize>().ok()) {
                            Some(rank) if rank > 0 && rank <= last_papers.len() => {
                                display_paper_detail(&last_papers[rank - 1], rank);
                            }
                            Some(rank) => eprintln!(
                                "Paper {} out of range (last answer used {} papers)",
                                rank,
                                last_papers.len()
                            ),
                            None => eprintln!("Usage: /detail N"),
                        },
                        "/history" => {
                            if session.is_empty() {
                                println!("No conversation yet.");
                            } else {
                                println!("{}", session.transcript());
                            }
                        }
                        "/clear" => {
                            session.clear();
                            last_papers.clear();
                            println!("Started a new conversation");
                        }
                        other => eprintln!("Unknown command: {}. Type /help for available commands.", other),
                    }
                    continue;
                }

                let start = Instant::now();
                match assistant.ask(line, &mut session).await {
                    Ok(answer) => {
                        println!("\nAI> {}\n", answer.text);
                        println!(
                            "({} papers, {:.2}s; /papers to list them)",
                            answer.papers.len(),
                            start.elapsed().as_secs_f64()
                        );
                        last_papers = answer.papers;
                    }
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct FetchedPaper<'a> {
    #[serde(flatten)]
    paper: &'a PaperRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    generated_summary: Option<&'a str>,
}

async fn run_fetch(config: &RagConfig, query: &str, summarize: bool, format: OutputFormat) -> Result<()> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let providers: Vec<Box<dyn PaperProvider>> = vec![
        Box::new(ArxivProvider::new(timeout).context("Failed to create arXiv client")?),
        Box::new(
            SemanticScholarProvider::new(timeout)
                .context("Failed to create Semantic Scholar client")?,
        ),
        Box::new(CoreProvider::new()),
    ];

    info!(query, "fetching papers");
    let papers = fetch_papers(&providers, query).await;
    if papers.is_empty() {
        println!("No papers found. Try a different topic.");
        return Ok(());
    }

    let summaries = if summarize {
        let answers = AnswerService::new(build_generator(config).context("Summaries need a Gemini key")?);
        Some(answers.summarize_all(&papers).await)
    } else {
        None
    };

    match format {
        OutputFormat::Table => println!("{}", format_papers_table(&papers, summaries.as_deref())),
        OutputFormat::Json => {
            let output: Vec<FetchedPaper> = papers
                .iter()
                .enumerate()
                .map(|(idx, paper)| FetchedPaper {
                    paper,
                    generated_summary: summaries.as_ref().and_then(|s| s.get(idx)).map(String::as_str),
                })
                .collect();
            print_json(&output)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let config = load_config(&args)?;
    info!(
        index = ?config.index_kind,
        retrieve_n = config.retrieve_n,
        keep_k = config.keep_k,
        "starting assistant"
    );

    match &args.command {
        Command::Search { query } => run_search(&config, query, args.format).await,
        Command::Ask { query } => run_ask(&config, query, args.format).await,
        Command::Chat => run_chat(&config).await,
        Command::Fetch { query, summarize } => run_fetch(&config, query, *summarize, args.format).await,
    }
}
