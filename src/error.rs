//! Error taxonomy for the RAG core.
//!
//! One variant per failure class. Guardrail blocks are deliberately *not*
//! errors — they are verdicts attached to the response (see
//! [`crate::models::GuardrailVerdict`]).
//!
//! Messages stored in these variants cross the caller-facing surface, so
//! constructors must keep them free of credentials, filesystem paths, and
//! backtraces.

use thiserror::Error;

/// Failure classes surfaced by the ingestion and query pipelines.
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad or oversized input bytes, or an unparseable document.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Chunker misconfiguration (e.g. overlap >= chunk size).
    #[error("chunking configuration invalid: {0}")]
    Chunking(String),

    /// Embedding provider or network failure.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Vector index backing-store I/O or contract violation.
    #[error("index operation failed: {0}")]
    Index(String),

    /// Document produced no indexable content, or its upsert failed.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// LLM provider, auth, or network failure during generation.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Invalid question input (empty, or over the length ceiling).
    #[error("invalid query: {0}")]
    Query(String),
}

impl RagError {
    /// Stable taxonomy kind for the caller-facing surface.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Extraction(_) => "extraction_error",
            RagError::Chunking(_) => "chunking_error",
            RagError::Embedding(_) => "embedding_error",
            RagError::Index(_) => "index_error",
            RagError::Ingestion(_) => "ingestion_error",
            RagError::Generation(_) => "generation_error",
            RagError::Query(_) => "query_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(RagError::Extraction("x".into()).kind(), "extraction_error");
        assert_eq!(RagError::Generation("x".into()).kind(), "generation_error");
    }

    #[test]
    fn display_includes_message() {
        let e = RagError::Ingestion("no extractable text".into());
        assert_eq!(e.to_string(), "ingestion failed: no extractable text");
    }
}
