//! Idempotent schema creation for the SQLite vector store.

use anyhow::Result;
use sqlx::SqlitePool;

/// Create the records table and its indexes if they do not exist.
///
/// Safe to run on every startup; a populated database is left untouched.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per indexed chunk. The embedding is a little-endian f32 BLOB;
    // `model` and `dims` record which embedder produced it so a collection
    // never silently mixes vector spaces.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_document_id ON records(collection, document_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
