//! # SciRAG CLI (`scirag`)
//!
//! Command-line interface for the SciRAG paper question-answering core.
//!
//! ## Usage
//!
//! ```bash
//! scirag --config ./config/scirag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scirag init` | Create the SQLite database and run schema migrations |
//! | `scirag search "<query>"` | Discover papers on arXiv |
//! | `scirag ingest <id>...` | Fetch, extract, chunk, embed, and index papers |
//! | `scirag ask "<question>"` | Answer a question against the indexed corpus |
//! | `scirag stats` | Show indexed chunk counts |
//!
//! API keys are read from the environment: `ANTHROPIC_API_KEY`,
//! `OPENAI_API_KEY`, `DEEPSEEK_API_KEY`, or `GEMINI_API_KEY` depending on
//! the configured providers. Log verbosity follows `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use scirag::config;
use scirag::db;
use scirag::embedding;
use scirag::extract::MIME_PDF;
use scirag::generate;
use scirag::migrate;
use scirag::models::Document;
use scirag::pipeline::RagPipeline;
use scirag::sqlite_index::SqliteIndex;

/// SciRAG CLI — retrieval-augmented question answering over scientific
/// papers.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/scirag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "scirag",
    about = "SciRAG — retrieval-augmented question answering over scientific papers",
    version,
    long_about = "SciRAG discovers papers on arXiv, extracts and chunks their text, embeds the \
    chunks into a SQLite vector index, and answers questions by retrieving the nearest chunks \
    and prompting a hosted LLM, with guardrail checks on both input and output."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/scirag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the records table. Idempotent —
    /// running it multiple times is safe.
    Init,

    /// Discover papers on arXiv.
    ///
    /// Prints id, title, authors, and date for each match, sorted by
    /// relevance. Use the printed ids with `scirag ingest`.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        max: Option<usize>,
    },

    /// Ingest papers by arXiv id.
    ///
    /// Fetches each paper's PDF, extracts and chunks the text, embeds the
    /// chunks, and indexes them. Papers already indexed are skipped; one
    /// failing paper never aborts the rest.
    Ingest {
        /// arXiv ids (e.g. `1706.03762`).
        #[arg(required = true)]
        ids: Vec<String>,

        /// Re-ingest papers that are already indexed, overwriting their
        /// chunks.
        #[arg(long)]
        force: bool,
    },

    /// Answer a question against the indexed papers.
    ///
    /// Retrieves the nearest chunks, prompts the configured LLM with them,
    /// and prints the answer with its sources and any guardrail warnings.
    Ask {
        /// The question.
        question: String,

        /// Number of chunks to retrieve (defaults to `retrieval.default_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Override the LLM provider (`anthropic`, `openai`, `deepseek`, `gemini`).
        #[arg(long)]
        provider: Option<String>,

        /// Override the LLM model name.
        #[arg(long)]
        model: Option<String>,
    },

    /// Show index statistics.
    Stats,
}

async fn build_pipeline(cfg: &config::Config) -> anyhow::Result<RagPipeline> {
    let pool = db::connect(&cfg.db).await?;
    migrate::run_migrations(&pool).await?;
    let index = Arc::new(SqliteIndex::new(pool));
    let embedder: Arc<dyn embedding::EmbeddingProvider> =
        embedding::create_provider(&cfg.embedding)
            .context("failed to create embedding provider")?
            .into();
    Ok(RagPipeline::new(cfg.clone(), embedder, index))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Search { query, max } => {
            let arxiv = scirag::arxiv::ArxivClient::new(&cfg.arxiv)?;
            let papers = arxiv.search(&query, max).await?;
            if papers.is_empty() {
                println!("No papers found for '{}'.", query);
                return Ok(());
            }
            for paper in papers {
                println!("{}  {}", paper.id, paper.title);
                println!("    {} · {}", paper.authors.join(", "), paper.published);
                println!("    {}", paper.url);
            }
        }
        Commands::Ingest { ids, force } => {
            let pipeline = build_pipeline(&cfg).await?;
            let arxiv = scirag::arxiv::ArxivClient::new(&cfg.arxiv)?;

            let mut documents = Vec::new();
            for id in &ids {
                let meta = arxiv
                    .fetch_by_id(id)
                    .await?
                    .with_context(|| format!("paper '{}' not found on arXiv", id))?;
                let bytes = arxiv
                    .fetch_pdf(&meta.pdf_url, cfg.limits.max_pdf_bytes)
                    .await?;
                documents.push(Document {
                    meta,
                    content_type: MIME_PDF.to_string(),
                    bytes,
                });
            }

            let report = pipeline.ingest(documents, force).await;
            println!(
                "Ingested {} papers ({} skipped, {} failed).",
                report.processed, report.skipped, report.failed
            );
            for (id, message) in &report.errors {
                println!("  {} failed: {}", id, message);
            }
        }
        Commands::Ask {
            question,
            k,
            provider,
            model,
        } => {
            let pipeline = build_pipeline(&cfg).await?;

            let mut llm_cfg = cfg.llm.clone();
            if let Some(provider) = provider {
                llm_cfg.provider = provider;
            }
            if let Some(model) = model {
                llm_cfg.model = Some(model);
            }
            let llm =
                generate::create_provider(&llm_cfg).context("failed to create LLM provider")?;

            let answer = pipeline.answer(&question, k, llm.as_ref()).await?;

            // Blocked questions carry no answer text, only the verdict.
            match answer.verdict.as_ref() {
                Some(verdict) if verdict.blocks() => println!("{}", verdict.message),
                _ => println!("{}", answer.answer),
            }
            if !answer.sources.is_empty() {
                println!("\nSources:");
                for source in &answer.sources {
                    println!("  - {} ({})", source.title, source.url);
                }
            }
            if let Some(verdict) = answer.verdict.as_ref().filter(|v| !v.blocks()) {
                println!("\nWarning: {}", verdict.message);
            }
        }
        Commands::Stats => {
            let pipeline = build_pipeline(&cfg).await?;
            println!(
                "Collection '{}': {} indexed chunks.",
                cfg.index.collection,
                pipeline.indexed_chunks().await?
            );
        }
    }

    Ok(())
}
