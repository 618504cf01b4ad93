//! SQLite-backed vector store with one table per collection.
//!
//! Collections are plain tables named by the config, created on demand.
//! Rows are keyed by the content-derived document id, so upserting the
//! same content is a no-op overwrite and re-ingesting a changed file
//! replaces exactly its own rows (after a `delete_by_source` sweep).
//! Embeddings are stored as little-endian f32 BLOBs.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::embedding::vec_to_blob;
use crate::error::IngestError;
use crate::models::EmbeddedDocument;

/// Collection names become SQL identifiers, so only letters, digits,
/// and underscores are allowed, and the first character must not be a
/// digit.
pub fn is_valid_collection(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        None => return false,
        Some(first) if first.is_ascii_digit() => return false,
        Some(first) if !(first.is_ascii_alphanumeric() || first == '_') => return false,
        Some(_) => {}
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_collection(name: &str) -> Result<(), IngestError> {
    if is_valid_collection(name) {
        Ok(())
    } else {
        Err(IngestError::InvalidCollection(name.to_string()))
    }
}

pub async fn connect(path: &Path) -> Result<SqlitePool, IngestError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|err| IngestError::io(parent, err))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create the collection table and its indexes if missing.
pub async fn ensure_collection(pool: &SqlitePool, collection: &str) -> Result<(), IngestError> {
    check_collection(collection)?;

    // collection is validated above; identifiers cannot be bound
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {collection} (
            id TEXT PRIMARY KEY,
            chunk_id TEXT NOT NULL,
            source_id TEXT NOT NULL,
            source_path TEXT NOT NULL,
            source_type TEXT NOT NULL,
            source_mtime TEXT NOT NULL,
            text TEXT NOT NULL,
            title TEXT NOT NULL,
            section TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            lang TEXT NOT NULL,
            embedding BLOB NOT NULL,
            embedding_model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_{collection}_chunk_id ON {collection}(chunk_id)"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{collection}_source_id ON {collection}(source_id)"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{collection}_tags ON {collection}(tags)"
    ))
    .execute(pool)
    .await?;

    Ok(())
}

/// Upsert documents one row at a time. A failing row is logged and
/// counted but does not stop the rest of the batch; any failures
/// surface as a single [`IngestError::StoreWrite`] at the end.
pub async fn upsert_documents(
    pool: &SqlitePool,
    collection: &str,
    docs: &[EmbeddedDocument],
) -> Result<usize, IngestError> {
    check_collection(collection)?;

    let sql = format!(
        r#"
        INSERT INTO {collection} (
            id, chunk_id, source_id, source_path, source_type, source_mtime,
            text, title, section, tags, lang, embedding, embedding_model,
            dims, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        ON CONFLICT(id) DO UPDATE SET
            chunk_id = excluded.chunk_id,
            source_id = excluded.source_id,
            source_path = excluded.source_path,
            source_type = excluded.source_type,
            source_mtime = excluded.source_mtime,
            text = excluded.text,
            title = excluded.title,
            section = excluded.section,
            tags = excluded.tags,
            lang = excluded.lang,
            embedding = excluded.embedding,
            embedding_model = excluded.embedding_model,
            dims = excluded.dims,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at
        "#
    );

    let mut failed = 0usize;
    for doc in docs {
        let tags = serde_json::to_string(&doc.metadata.tags).unwrap_or_else(|_| "[]".to_string());
        let result = sqlx::query(&sql)
            .bind(&doc.id)
            .bind(&doc.chunk_id)
            .bind(&doc.source.source_id)
            .bind(&doc.source.path)
            .bind(&doc.source.source_type)
            .bind(&doc.source.mtime)
            .bind(&doc.text)
            .bind(&doc.metadata.title)
            .bind(&doc.metadata.section)
            .bind(&tags)
            .bind(&doc.metadata.lang)
            .bind(vec_to_blob(&doc.embedding))
            .bind(&doc.embedding_model)
            .bind(doc.dims as i64)
            .bind(&doc.created_at)
            .bind(&doc.updated_at)
            .execute(pool)
            .await;

        if let Err(err) = result {
            tracing::warn!(id = %doc.id, error = %err, "Failed to upsert document");
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(IngestError::StoreWrite {
            collection: collection.to_string(),
            failed,
            total: docs.len(),
        });
    }
    Ok(docs.len())
}

/// Remove every document belonging to a source. Returns the number of
/// rows deleted.
pub async fn delete_by_source(
    pool: &SqlitePool,
    collection: &str,
    source_id: &str,
) -> Result<u64, IngestError> {
    check_collection(collection)?;

    let result = sqlx::query(&format!("DELETE FROM {collection} WHERE source_id = ?1"))
        .bind(source_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_documents(pool: &SqlitePool, collection: &str) -> Result<i64, IngestError> {
    check_collection(collection)?;

    if !table_exists(pool, collection).await? {
        return Ok(0);
    }
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {collection}"))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

async fn table_exists(pool: &SqlitePool, name: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name = ?1")
        .bind(name)
        .fetch_one(pool)
        .await
}
