//! Ingestion and question-answering orchestration.
//!
//! [`RagPipeline`] wires the extractor, chunker, embedder, vector index,
//! and guardrails together behind two entry points:
//!
//! - [`RagPipeline::ingest`] — extract, chunk, embed, and index a batch of
//!   documents with bounded concurrency. Already-indexed documents are
//!   skipped without re-embedding; one bad document never fails the batch.
//! - [`RagPipeline::answer`] — guardrail pre-check, retrieval, generation,
//!   guardrail post-check. A blocking verdict short-circuits before any
//!   retrieval or LLM call.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::chunk::{chunk_id, chunk_text};
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extract::{extract_text, ExtractLimits};
use crate::generate::{build_prompt, LlmProvider};
use crate::guardrail::GuardrailEngine;
use crate::index::{IndexRecord, VectorIndex};
use crate::models::{Answer, ChunkMetadata, Document, IngestReport};
use crate::retrieve::retrieve;

/// Outcome of ingesting a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Newly extracted, chunked, embedded, and indexed.
    Processed { chunks: usize },
    /// Already fully indexed; nothing touched.
    Skipped,
}

#[derive(Clone)]
pub struct RagPipeline {
    config: Arc<Config>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    guardrails: Arc<GuardrailEngine>,
}

impl RagPipeline {
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let guardrails = Arc::new(GuardrailEngine::new(&config.guardrails));
        Self {
            config: Arc::new(config),
            embedder,
            index,
            guardrails,
        }
    }

    fn collection(&self) -> &str {
        &self.config.index.collection
    }

    /// Ingest one document end to end.
    ///
    /// Idempotent: chunk ids are deterministic and upserts are atomic, so
    /// if the document's first chunk is already indexed the whole document
    /// is, and ingestion is skipped without re-extracting or re-embedding.
    /// `force` disables the skip and overwrites the existing chunks.
    pub async fn ingest_document(&self, doc: &Document, force: bool) -> Result<IngestOutcome> {
        let sentinel = chunk_id(&doc.meta.id, 0);
        if !force {
            let present = self
                .index
                .exists(self.collection(), &[sentinel.clone()])
                .await?;
            if present.contains(&sentinel) {
                info!(document_id = %doc.meta.id, "already indexed, skipping");
                return Ok(IngestOutcome::Skipped);
            }
        }

        let limits = ExtractLimits {
            max_bytes: self.config.limits.max_pdf_bytes,
            max_pages: self.config.limits.max_pages,
        };
        let text = extract_text(&doc.bytes, &doc.content_type, limits)?;

        let chunks = chunk_text(
            &doc.meta.id,
            &text,
            self.config.chunking.chunk_size,
            self.config.chunking.overlap,
        );
        if chunks.is_empty() {
            return Err(RagError::Ingestion(format!(
                "document '{}' produced no extractable text",
                doc.meta.id
            )));
        }

        // Embed in bounded batches; vectors come back in input order.
        let mut vectors = Vec::with_capacity(chunks.len());
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        for batch in texts.chunks(self.config.embedding.batch_size.max(1)) {
            vectors.extend(self.embedder.embed(batch).await?);
        }
        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let records: Vec<IndexRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexRecord {
                id: chunk.id.clone(),
                vector,
                text: chunk.text.clone(),
                hash: chunk.hash.clone(),
                metadata: ChunkMetadata {
                    document_id: doc.meta.id.clone(),
                    title: doc.meta.title.clone(),
                    authors: doc.meta.authors.clone(),
                    published: doc.meta.published.clone(),
                    url: doc.meta.url.clone(),
                    chunk_index: chunk.chunk_index,
                },
            })
            .collect();

        self.index
            .upsert(self.collection(), self.embedder.model_name(), &records)
            .await?;

        info!(
            document_id = %doc.meta.id,
            chunks = records.len(),
            "document indexed"
        );
        Ok(IngestOutcome::Processed {
            chunks: records.len(),
        })
    }

    /// Ingest a batch of documents with at most `ingest.workers` in flight.
    ///
    /// Per-document failures are recorded in the report, never propagated;
    /// a batch with one bad PDF still indexes the rest.
    pub async fn ingest(&self, documents: Vec<Document>, force: bool) -> IngestReport {
        let semaphore = Arc::new(Semaphore::new(self.config.ingest.workers));
        let mut tasks = JoinSet::new();

        for doc in documents {
            let pipeline = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // Semaphore is never closed while tasks run.
                let _permit = semaphore.acquire().await;
                let id = doc.meta.id.clone();
                (id, pipeline.ingest_document(&doc, force).await)
            });
        }

        let mut report = IngestReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(IngestOutcome::Processed { .. }))) => report.processed += 1,
                Ok((_, Ok(IngestOutcome::Skipped))) => report.skipped += 1,
                Ok((id, Err(e))) => {
                    warn!(document_id = %id, error = %e, "document ingestion failed");
                    report.failed += 1;
                    report.errors.push((id, e.to_string()));
                }
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(("<task>".to_string(), e.to_string()));
                }
            }
        }
        report
    }

    /// Answer a question against the indexed corpus.
    ///
    /// Flow: pre-check, retrieve, generate, post-check. A blocking
    /// pre-check verdict returns immediately with no retrieval and no LLM
    /// call. Non-blocking verdicts ride along on the answer; when both a
    /// pre-check warning and a post-check verdict exist, the post-check
    /// one wins.
    pub async fn answer(
        &self,
        question: &str,
        k: Option<usize>,
        llm: &dyn LlmProvider,
    ) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Query("question is empty".to_string()));
        }
        if question.len() > self.config.limits.max_query_len {
            return Err(RagError::Query(format!(
                "question exceeds {} characters",
                self.config.limits.max_query_len
            )));
        }

        if let Some(verdict) = self.guardrails.pre_check(question) {
            if verdict.blocks() {
                info!(kind = ?verdict.kind, "question blocked by guardrails");
                // No answer text for blocked questions; callers render the
                // verdict message instead.
                return Ok(Answer {
                    answer: String::new(),
                    sources: Vec::new(),
                    verdict: Some(verdict),
                });
            }
            // Warning verdicts (off-topic) continue through the pipeline.
            let warning = verdict;
            let mut answer = self.answer_unchecked(question, k, llm).await?;
            if answer.verdict.is_none() {
                answer.verdict = Some(warning);
            }
            return Ok(answer);
        }

        self.answer_unchecked(question, k, llm).await
    }

    async fn answer_unchecked(
        &self,
        question: &str,
        k: Option<usize>,
        llm: &dyn LlmProvider,
    ) -> Result<Answer> {
        let k = k.unwrap_or(self.config.retrieval.default_k);
        let retrieval = retrieve(
            self.embedder.as_ref(),
            self.index.as_ref(),
            self.collection(),
            question,
            k,
            self.config.retrieval.max_k,
        )
        .await?;

        let prompt = build_prompt(question, &retrieval.chunks);
        let generated = llm.generate(&prompt).await?;

        let verdict = self
            .guardrails
            .post_check(&generated, &retrieval.context_texts());

        Ok(Answer {
            answer: generated,
            sources: retrieval.sources,
            verdict,
        })
    }

    /// Number of indexed chunks in the active collection.
    pub async fn indexed_chunks(&self) -> Result<u64> {
        self.index.count(self.collection()).await
    }
}
