//! SQLite-backed [`VectorIndex`].
//!
//! Vectors live alongside chunk text and citation metadata in a single
//! `records` table, embeddings stored as little-endian f32 BLOBs. Queries
//! brute-force cosine distance over the collection, which is fine at
//! corpus scale (thousands of chunks, not millions).

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::error::{RagError, Result};
use crate::index::{rank_hits, sanitize_metadata, IndexHit, IndexRecord, VectorIndex};
use crate::models::ChunkMetadata;

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn collection_model(&self, collection: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT model FROM records WHERE collection = ? LIMIT 1")
            .bind(collection)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RagError::Index(format!("model lookup failed: {}", e)))?;
        Ok(row.map(|r| r.get::<String, _>("model")))
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, collection: &str, model: &str, records: &[IndexRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        if let Some(existing) = self.collection_model(collection).await? {
            if existing != model {
                return Err(RagError::Index(format!(
                    "collection '{}' holds vectors from model '{}', refusing to mix in '{}'",
                    collection, existing, model
                )));
            }
        }

        // All records land or none do; a failed batch leaves no partial
        // document behind.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RagError::Index(format!("begin transaction failed: {}", e)))?;

        let now = chrono::Utc::now().timestamp();
        for record in records {
            let metadata = sanitize_metadata(&record.metadata);
            let metadata_json = serde_json::to_string(&metadata)
                .map_err(|e| RagError::Index(format!("metadata serialization failed: {}", e)))?;

            sqlx::query(
                r#"
                INSERT OR REPLACE INTO records
                    (collection, id, document_id, chunk_index, text, hash,
                     metadata_json, embedding, model, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(collection)
            .bind(&record.id)
            .bind(&metadata.document_id)
            .bind(metadata.chunk_index)
            .bind(&record.text)
            .bind(&record.hash)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.vector))
            .bind(model)
            .bind(record.vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| RagError::Index(format!("insert failed: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| RagError::Index(format!("commit failed: {}", e)))?;
        Ok(())
    }

    async fn query(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let rows = sqlx::query(
            "SELECT id, text, metadata_json, embedding FROM records WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RagError::Index(format!("query failed: {}", e)))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let text: String = row.get("text");
            let metadata_json: String = row.get("metadata_json");
            let blob: Vec<u8> = row.get("embedding");

            let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)
                .map_err(|e| RagError::Index(format!("metadata for '{}' corrupt: {}", id, e)))?;

            let stored = blob_to_vec(&blob);
            hits.push(IndexHit {
                id,
                text,
                metadata,
                distance: cosine_distance(vector, &stored),
            });
        }

        rank_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn exists(&self, collection: &str, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id FROM records WHERE collection = ? AND id IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(collection);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RagError::Index(format!("exists check failed: {}", e)))?;

        Ok(rows.into_iter().map(|r| r.get::<String, _>("id")).collect())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RagError::Index(format!("count failed: {}", e)))?;
        Ok(count as u64)
    }
}
