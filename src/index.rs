//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the storage operations the ingestion
//! and retrieval pipelines need, keyed by a named collection, enabling
//! pluggable backends (SQLite, in-memory for tests).
//!
//! Contract highlights:
//! - `upsert` is all-or-nothing per call and insert-or-replace by id, so
//!   retries and concurrent re-ingestion of the same document are safe.
//! - A collection holds vectors from exactly one embedding model; mixing
//!   models is rejected.
//! - `query` orders by ascending cosine distance, ties broken by chunk id.
//! - Metadata is sanitized at this boundary before storage.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::error::{RagError, Result};
use crate::models::ChunkMetadata;

/// A chunk bound for storage: vector, text, citation metadata, and the
/// content hash used for staleness comparison on re-ingest.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    pub metadata: ChunkMetadata,
}

/// A ranked nearest-neighbor result.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance to the query vector (lower is closer).
    pub distance: f32,
}

/// Abstract durable store of indexed records, keyed by collection name.
///
/// Implementations must support concurrent reads; same-id writes are
/// last-writer-wins.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite records by id, atomically from the caller's
    /// perspective. `model` names the embedding model that produced the
    /// vectors; a collection never mixes models.
    async fn upsert(&self, collection: &str, model: &str, records: &[IndexRecord]) -> Result<()>;

    /// Return at most `k` nearest neighbors by cosine distance. An empty
    /// collection yields an empty list, not an error.
    async fn query(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<IndexHit>>;

    /// Return the subset of `ids` present in the collection.
    async fn exists(&self, collection: &str, ids: &[String]) -> Result<HashSet<String>>;

    /// Number of records in the collection.
    async fn count(&self, collection: &str) -> Result<u64>;
}

/// Maximum stored length for any single metadata string field.
const MAX_METADATA_FIELD_LEN: usize = 512;

/// Normalize citation metadata before storage: strip control characters and
/// truncate oversized fields. Applied inside every `upsert`.
pub fn sanitize_metadata(meta: &ChunkMetadata) -> ChunkMetadata {
    ChunkMetadata {
        document_id: clean_field(&meta.document_id),
        title: clean_field(&meta.title),
        authors: meta.authors.iter().map(|a| clean_field(a)).collect(),
        published: clean_field(&meta.published),
        url: clean_field(&meta.url),
        chunk_index: meta.chunk_index,
    }
}

fn clean_field(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string();
    cleaned.chars().take(MAX_METADATA_FIELD_LEN).collect()
}

/// Sort hits by ascending distance, ties broken by ascending chunk id so
/// rankings are deterministic across backends.
pub fn rank_hits(hits: &mut [IndexHit]) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

// Hash is not kept here; only the durable backend persists it.
struct StoredRecord {
    vector: Vec<f32>,
    text: String,
    metadata: ChunkMetadata,
}

struct MemoryCollection {
    model: String,
    records: HashMap<String, StoredRecord>,
}

/// In-memory [`VectorIndex`] for tests. Brute-force cosine over all stored
/// vectors, same ranking and model-mixing rules as the SQLite backend.
#[derive(Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, collection: &str, model: &str, records: &[IndexRecord]) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| RagError::Index("index lock poisoned".to_string()))?;

        let entry = collections
            .entry(collection.to_string())
            .or_insert_with(|| MemoryCollection {
                model: model.to_string(),
                records: HashMap::new(),
            });

        if entry.model != model {
            return Err(RagError::Index(format!(
                "collection '{}' holds vectors from model '{}', refusing to mix in '{}'",
                collection, entry.model, model
            )));
        }

        for record in records {
            entry.records.insert(
                record.id.clone(),
                StoredRecord {
                    vector: record.vector.clone(),
                    text: record.text.clone(),
                    metadata: sanitize_metadata(&record.metadata),
                },
            );
        }
        Ok(())
    }

    async fn query(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| RagError::Index("index lock poisoned".to_string()))?;

        let entry = match collections.get(collection) {
            Some(e) => e,
            None => return Ok(Vec::new()),
        };

        let mut hits: Vec<IndexHit> = entry
            .records
            .iter()
            .map(|(id, stored)| IndexHit {
                id: id.clone(),
                text: stored.text.clone(),
                metadata: stored.metadata.clone(),
                distance: cosine_distance(vector, &stored.vector),
            })
            .collect();

        rank_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn exists(&self, collection: &str, ids: &[String]) -> Result<HashSet<String>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| RagError::Index("index lock poisoned".to_string()))?;

        let entry = match collections.get(collection) {
            Some(e) => e,
            None => return Ok(HashSet::new()),
        };

        Ok(ids
            .iter()
            .filter(|id| entry.records.contains_key(*id))
            .cloned()
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let collections = self
            .collections
            .read()
            .map_err(|_| RagError::Index("index lock poisoned".to_string()))?;
        Ok(collections
            .get(collection)
            .map(|e| e.records.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(doc: &str, index: i64) -> ChunkMetadata {
        ChunkMetadata {
            document_id: doc.to_string(),
            title: format!("Paper {}", doc),
            authors: vec!["A. Author".to_string()],
            published: "2024-01-01".to_string(),
            url: format!("https://arxiv.org/abs/{}", doc),
            chunk_index: index,
        }
    }

    fn record(doc: &str, index: i64, vector: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: format!("{}_{}", doc, index),
            vector,
            text: format!("chunk {} of {}", index, doc),
            hash: format!("hash-{}-{}", doc, index),
            metadata: meta(doc, index),
        }
    }

    #[tokio::test]
    async fn empty_collection_queries_empty() {
        let index = MemoryIndex::new();
        let hits = index.query("papers", &[1.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(index.count("papers").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn identical_vector_ranks_first_with_zero_distance() {
        let index = MemoryIndex::new();
        index
            .upsert(
                "papers",
                "m1",
                &[
                    record("a", 0, vec![1.0, 0.0, 0.0]),
                    record("b", 0, vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("papers", &[0.0, 1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].id, "b_0");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn equal_distances_tie_break_by_id() {
        let index = MemoryIndex::new();
        // Same vector for both records: identical distance to any query.
        index
            .upsert(
                "papers",
                "m1",
                &[
                    record("z", 0, vec![1.0, 1.0]),
                    record("a", 0, vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("papers", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].id, "a_0");
        assert_eq!(hits[1].id, "z_0");
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let index = MemoryIndex::new();
        index
            .upsert("papers", "m1", &[record("a", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert("papers", "m1", &[record("a", 0, vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(index.count("papers").await.unwrap(), 1);
        let hits = index.query("papers", &[0.0, 1.0], 1).await.unwrap();
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn model_mixing_rejected() {
        let index = MemoryIndex::new();
        index
            .upsert("papers", "m1", &[record("a", 0, vec![1.0])])
            .await
            .unwrap();
        let err = index
            .upsert("papers", "m2", &[record("b", 0, vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Index(_)));
    }

    #[tokio::test]
    async fn exists_returns_present_subset() {
        let index = MemoryIndex::new();
        index
            .upsert("papers", "m1", &[record("a", 0, vec![1.0])])
            .await
            .unwrap();

        let present = index
            .exists("papers", &["a_0".to_string(), "a_1".to_string()])
            .await
            .unwrap();
        assert!(present.contains("a_0"));
        assert!(!present.contains("a_1"));
    }

    #[test]
    fn sanitize_strips_control_chars_and_truncates() {
        let mut m = meta("a", 0);
        m.title = format!("bad\u{0000}title\n{}", "x".repeat(1000));
        let clean = sanitize_metadata(&m);
        assert!(!clean.title.contains('\u{0000}'));
        assert!(!clean.title.contains('\n'));
        assert!(clean.title.chars().count() <= 512);
    }
}
