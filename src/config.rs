use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub arxiv: ArxivConfig,
    #[serde(default)]
    pub guardrails: GuardrailConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// SQLite connection pool size.
    #[serde(default = "default_db_connections")]
    pub max_connections: u32,
}

fn default_db_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
        }
    }
}

fn default_collection() -> String {
    "papers".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Words per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlapping words between consecutive chunks. Must be < chunk_size.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_k: default_max_k(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_max_k() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"`, `"ollama"`, or `"local"` (feature `local-embeddings`).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `"anthropic"`, `"openai"`, `"deepseek"`, or `"gemini"`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    /// Provider-specific model override; each adapter has a default.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
        }
    }
}

fn default_llm_provider() -> String {
    "anthropic".to_string()
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_llm_max_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Hard ceiling on document bytes, rejected before parsing.
    #[serde(default = "default_max_pdf_bytes")]
    pub max_pdf_bytes: usize,
    /// Pages beyond this are dropped, with a logged warning.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_max_query_len")]
    pub max_query_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_pdf_bytes: default_max_pdf_bytes(),
            max_pages: default_max_pages(),
            max_query_len: default_max_query_len(),
        }
    }
}

fn default_max_pdf_bytes() -> usize {
    50 * 1024 * 1024
}
fn default_max_pages() -> usize {
    500
}
fn default_max_query_len() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Bounded worker count for concurrent document ingestion.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArxivConfig {
    #[serde(default = "default_arxiv_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: default_arxiv_base_url(),
            max_results: default_max_results(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_arxiv_base_url() -> String {
    "https://export.arxiv.org/api/query".to_string()
}
fn default_max_results() -> usize {
    5
}

/// Tunable guardrail keyword lists and thresholds. Empty lists fall back to
/// the built-in defaults in [`crate::guardrail`].
#[derive(Debug, Deserialize, Clone)]
pub struct GuardrailConfig {
    #[serde(default)]
    pub harmful_keywords: Vec<String>,
    #[serde(default)]
    pub jailbreak_patterns: Vec<String>,
    #[serde(default)]
    pub off_topic_patterns: Vec<String>,
    #[serde(default)]
    pub research_keywords: Vec<String>,
    /// Numeric tokens in the answer absent from context above this count
    /// flag a hallucination.
    #[serde(default = "default_hallucination_numbers")]
    pub hallucination_number_threshold: usize,
    /// Minimum meaningful word overlap between answer and context.
    #[serde(default = "default_grounding_overlap")]
    pub grounding_overlap_threshold: usize,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            harmful_keywords: Vec::new(),
            jailbreak_patterns: Vec::new(),
            off_topic_patterns: Vec::new(),
            research_keywords: Vec::new(),
            hallucination_number_threshold: default_hallucination_numbers(),
            grounding_overlap_threshold: default_grounding_overlap(),
        }
    }
}

fn default_hallucination_numbers() -> usize {
    3
}
fn default_grounding_overlap() -> usize {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Reject misconfiguration at startup rather than mid-pipeline.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be < chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.default_k < 1 {
        anyhow::bail!("retrieval.default_k must be >= 1");
    }
    if config.retrieval.max_k < config.retrieval.default_k {
        anyhow::bail!("retrieval.max_k must be >= retrieval.default_k");
    }

    match config.embedding.provider.as_str() {
        "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "anthropic" | "openai" | "deepseek" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be anthropic, openai, deepseek, or gemini.",
            other
        ),
    }

    if config.ingest.workers == 0 {
        anyhow::bail!("ingest.workers must be >= 1");
    }
    if config.limits.max_pdf_bytes == 0 || config.limits.max_pages == 0 {
        anyhow::bail!("limits.max_pdf_bytes and limits.max_pages must be > 0");
    }

    Ok(())
}
