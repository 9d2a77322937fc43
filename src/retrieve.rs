//! Query-side retrieval: embed the question, rank chunks, collect sources.

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::{RetrievedChunk, Source};

/// Ranked chunks plus the deduplicated source list for citation.
#[derive(Debug, Default)]
pub struct Retrieval {
    pub chunks: Vec<RetrievedChunk>,
    /// One entry per distinct document, in rank order of its best chunk.
    pub sources: Vec<Source>,
}

impl Retrieval {
    /// The chunk texts in rank order, as fed to the prompt and the
    /// grounding checks.
    pub fn context_texts(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.text.clone()).collect()
    }
}

/// Embed `query` and return its `k` nearest chunks with deduplicated
/// sources. `k` is clamped to `[1, max_k]`.
pub async fn retrieve(
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    collection: &str,
    query: &str,
    k: usize,
    max_k: usize,
) -> Result<Retrieval> {
    let k = k.clamp(1, max_k);

    let vectors = embedder.embed(&[query.to_string()]).await?;
    let query_vector = match vectors.first() {
        Some(v) => v,
        None => return Ok(Retrieval::default()),
    };

    let hits = index.query(collection, query_vector, k).await?;

    let mut chunks = Vec::with_capacity(hits.len());
    let mut sources: Vec<Source> = Vec::new();
    for hit in hits {
        if !sources
            .iter()
            .any(|s| s.document_id == hit.metadata.document_id)
        {
            sources.push(Source::from(&hit.metadata));
        }
        chunks.push(RetrievedChunk {
            chunk_id: hit.id,
            text: hit.text,
            metadata: hit.metadata,
            distance: hit.distance,
        });
    }

    Ok(Retrieval { chunks, sources })
}
