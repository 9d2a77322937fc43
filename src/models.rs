//! Core data models used throughout the RAG pipeline.
//!
//! These types represent the papers, chunks, verdicts, and answers that flow
//! through ingestion and question answering.

use serde::{Deserialize, Serialize};

/// Paper metadata in the discovery-service output shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperMeta {
    /// External identifier (e.g. `"2301.12345v1"`).
    pub id: String,
    pub title: String,
    /// Ordered author list.
    pub authors: Vec<String>,
    /// Publication date, `YYYY-MM-DD`.
    pub published: String,
    /// Abstract page URL.
    pub url: String,
    pub pdf_url: String,
    pub summary: String,
    pub categories: Vec<String>,
}

/// A selected paper with its raw payload, prior to ingestion.
///
/// The byte payload and extracted text are transient: only chunks persist.
#[derive(Debug, Clone)]
pub struct Document {
    pub meta: PaperMeta,
    /// MIME type of `bytes` (`application/pdf` or `text/plain`).
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A bounded window of a document's extracted text, the unit of embedding
/// and retrieval.
///
/// Identity is `{document_id}_{chunk_index}`, globally unique and
/// deterministic, which makes re-ingestion idempotent.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// 0-based, contiguous within a document.
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`, for staleness detection.
    pub hash: String,
}

/// Citation metadata copied onto every chunk so retrieval results are
/// self-contained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published: String,
    pub url: String,
    pub chunk_index: i64,
}

/// A cited source document, deduplicated per answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub document_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published: String,
    pub url: String,
}

impl From<&ChunkMetadata> for Source {
    fn from(meta: &ChunkMetadata) -> Self {
        Self {
            document_id: meta.document_id.clone(),
            title: meta.title.clone(),
            authors: meta.authors.clone(),
            published: meta.published.clone(),
            url: meta.url.clone(),
        }
    }
}

/// Classification produced by the guardrail engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Harmful,
    Jailbreak,
    OffTopic,
    Hallucination,
    NotGrounded,
}

/// Whether a verdict blocks the query or merely annotates the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// A guardrail classification outcome. Attached to the response, never
/// silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    pub kind: VerdictKind,
    pub severity: Severity,
    pub message: String,
}

impl GuardrailVerdict {
    pub fn blocks(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// A generated answer with its citations and optional guardrail annotation.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Empty when a blocking verdict short-circuited generation.
    pub answer: String,
    /// Ordered by retrieval rank, deduplicated by source document.
    pub sources: Vec<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<GuardrailVerdict>,
}

/// A retrieved chunk with its citation metadata and distance.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance to the query vector (lower is closer).
    pub distance: f32,
}

/// Outcome of ingesting a batch of documents.
///
/// Individual failures never abort the batch; they are recorded here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub processed: usize,
    /// Documents already fully indexed, left untouched.
    pub skipped: usize,
    pub failed: usize,
    /// `(document_id, message)` per failed document.
    pub errors: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_kind_serializes_snake_case() {
        let v = serde_json::to_string(&VerdictKind::NotGrounded).unwrap();
        assert_eq!(v, "\"not_grounded\"");
        let s = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(s, "\"warning\"");
    }

    #[test]
    fn source_from_chunk_metadata() {
        let meta = ChunkMetadata {
            document_id: "1706.03762v7".into(),
            title: "Attention Is All You Need".into(),
            authors: vec!["A. Vaswani".into()],
            published: "2017-06-12".into(),
            url: "https://arxiv.org/abs/1706.03762".into(),
            chunk_index: 0,
        };
        let source = Source::from(&meta);
        assert_eq!(source.title, "Attention Is All You Need");
        assert_eq!(source.authors.len(), 1);
    }
}
