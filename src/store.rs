//! Persistent index storage.
//!
//! The [`IndexStore`] trait is the pipeline's only view of persistence:
//! point lookup by id, filtered lookup by source path, and atomic
//! per-document upsert. The bundled [`SqliteStore`] persists across runs
//! at a configured location; [`MemoryStore`] backs tests.
//!
//! An upsert replaces every record for the batch's source paths inside one
//! transaction, so a document that shrank leaves no orphan chunks behind
//! and a reader never observes two versions of one document interleaved.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::embed::{blob_to_vec, vec_to_blob};
use crate::error::StoreError;
use crate::models::{Chunk, DocumentKind, IndexRecord};

/// Abstract index storage backend.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Point lookup. Missing ids are simply absent from the result.
    async fn get(&self, ids: &[String]) -> Result<Vec<IndexRecord>, StoreError>;

    /// All records whose source equals `source`, ordered by page then
    /// chunk index.
    async fn get_by_source(&self, source: &str) -> Result<Vec<IndexRecord>, StoreError>;

    /// Insert-or-overwrite the batch atomically. Existing records for the
    /// batch's sources are removed in the same transaction. Returns the
    /// number of records written.
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize, StoreError>;

    /// Remove all records for one source. Returns the number removed.
    async fn delete_by_source(&self, source: &str) -> Result<usize, StoreError>;

    async fn count_sources(&self) -> Result<u64, StoreError>;

    async fn count_chunks(&self) -> Result<u64, StoreError>;

    /// Drop every record.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Embedding dimensionality, discovered from one stored record.
    /// `None` while the store is empty.
    async fn probe_dims(&self) -> Result<Option<usize>, StoreError>;
}

// ============ SQLite ============

/// SQLite-backed store (WAL mode), created on first connect.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema
    /// exists. Parent directories are created if absent.
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Init(e.to_string()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| StoreError::Init(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Init(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                kind TEXT NOT NULL,
                page INTEGER,
                total_pages INTEGER,
                chunk_index INTEGER NOT NULL,
                total_chunks INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                text TEXT NOT NULL,
                processed_at INTEGER NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Init(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Init(e.to_string()))?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<IndexRecord, StoreError> {
    let kind: String = row.get("kind");
    let page: Option<i64> = row.get("page");
    let total_pages: Option<i64> = row.get("total_pages");
    let kind = match kind.as_str() {
        "plain" => DocumentKind::Plain,
        "docx" => DocumentKind::Docx,
        "pdf" => match (page, total_pages) {
            (Some(page), Some(total_pages)) => DocumentKind::Pdf {
                page: page as u32,
                total_pages: total_pages as u32,
            },
            _ => {
                return Err(StoreError::Query(
                    "pdf record missing page coordinates".to_string(),
                ))
            }
        },
        other => return Err(StoreError::Query(format!("unknown record kind: {}", other))),
    };

    let processed_at: i64 = row.get("processed_at");
    let processed_at = chrono::DateTime::from_timestamp(processed_at, 0)
        .ok_or_else(|| StoreError::Query("invalid processed_at timestamp".to_string()))?;

    let embedding: Vec<u8> = row.get("embedding");

    Ok(IndexRecord {
        chunk: Chunk {
            id: row.get("id"),
            source: row.get("source"),
            kind,
            chunk_index: row.get::<i64, _>("chunk_index") as u32,
            total_chunks: row.get::<i64, _>("total_chunks") as u32,
            content_hash: row.get("content_hash"),
            text: row.get("text"),
            processed_at,
        },
        embedding: blob_to_vec(&embedding),
    })
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn get(&self, ids: &[String]) -> Result<Vec<IndexRecord>, StoreError> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query("SELECT * FROM chunks WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;
            if let Some(row) = row {
                records.push(record_from_row(&row)?);
            }
        }
        Ok(records)
    }

    async fn get_by_source(&self, source: &str) -> Result<Vec<IndexRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM chunks WHERE source = ? ORDER BY page ASC, chunk_index ASC",
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.iter().map(record_from_row).collect()
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;

        let sources: BTreeSet<&str> = records.iter().map(|r| r.chunk.source.as_str()).collect();
        for source in sources {
            sqlx::query("DELETE FROM chunks WHERE source = ?")
                .bind(source)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Write(e.to_string()))?;
        }

        for record in records {
            let chunk = &record.chunk;
            let (kind, page, total_pages) = match chunk.kind {
                DocumentKind::Plain => ("plain", None, None),
                DocumentKind::Docx => ("docx", None, None),
                DocumentKind::Pdf { page, total_pages } => {
                    ("pdf", Some(page as i64), Some(total_pages as i64))
                }
            };

            sqlx::query(
                r#"
                INSERT INTO chunks
                    (id, source, kind, page, total_pages, chunk_index, total_chunks,
                     content_hash, text, processed_at, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(kind)
            .bind(page)
            .bind(total_pages)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.total_chunks as i64)
            .bind(&chunk.content_hash)
            .bind(&chunk.text)
            .bind(chunk.processed_at.timestamp())
            .bind(vec_to_blob(&record.embedding))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;

        Ok(records.len())
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM chunks WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(result.rows_affected() as usize)
    }

    async fn count_sources(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(count as u64)
    }

    async fn count_chunks(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(count as u64)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM chunks")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(())
    }

    async fn probe_dims(&self) -> Result<Option<usize>, StoreError> {
        let blob: Option<Vec<u8>> = sqlx::query_scalar("SELECT embedding FROM chunks LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(blob.map(|b| b.len() / 4))
    }
}

// ============ In-memory ============

/// In-memory store for tests and examples. Keyed by chunk id; the map is
/// ordered so reads come back deterministically.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, IndexRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn get(&self, ids: &[String]) -> Result<Vec<IndexRecord>, StoreError> {
        let records = self.records.read().unwrap();
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }

    async fn get_by_source(&self, source: &str) -> Result<Vec<IndexRecord>, StoreError> {
        let records = self.records.read().unwrap();
        let mut matching: Vec<IndexRecord> = records
            .values()
            .filter(|r| r.chunk.source == source)
            .cloned()
            .collect();
        matching.sort_by_key(|r| (r.chunk.kind.page(), r.chunk.chunk_index));
        Ok(matching)
    }

    async fn upsert(&self, batch: &[IndexRecord]) -> Result<usize, StoreError> {
        let mut records = self.records.write().unwrap();
        let sources: BTreeSet<String> = batch.iter().map(|r| r.chunk.source.clone()).collect();
        records.retain(|_, r| !sources.contains(&r.chunk.source));
        for record in batch {
            records.insert(record.chunk.id.clone(), record.clone());
        }
        Ok(batch.len())
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize, StoreError> {
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|_, r| r.chunk.source != source);
        Ok(before - records.len())
    }

    async fn count_sources(&self) -> Result<u64, StoreError> {
        let records = self.records.read().unwrap();
        let sources: BTreeSet<&str> =
            records.values().map(|r| r.chunk.source.as_str()).collect();
        Ok(sources.len() as u64)
    }

    async fn count_chunks(&self) -> Result<u64, StoreError> {
        Ok(self.records.read().unwrap().len() as u64)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.records.write().unwrap().clear();
        Ok(())
    }

    async fn probe_dims(&self) -> Result<Option<usize>, StoreError> {
        let records = self.records.read().unwrap();
        Ok(records.values().next().map(|r| r.embedding.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str, source: &str, index: u32, total: u32, hash: &str) -> IndexRecord {
        IndexRecord {
            chunk: Chunk {
                id: id.to_string(),
                source: source.to_string(),
                kind: DocumentKind::Plain,
                chunk_index: index,
                total_chunks: total,
                content_hash: hash.to_string(),
                text: format!("text {}", index),
                processed_at: Utc::now(),
            },
            embedding: vec![0.1, 0.2, 0.3],
        }
    }

    #[tokio::test]
    async fn memory_upsert_and_lookup() {
        let store = MemoryStore::new();
        store
            .upsert(&[record("a", "/kb/a.txt", 0, 2, "h1"), record("b", "/kb/a.txt", 1, 2, "h1")])
            .await
            .unwrap();

        let by_source = store.get_by_source("/kb/a.txt").await.unwrap();
        assert_eq!(by_source.len(), 2);
        assert_eq!(by_source[0].chunk.chunk_index, 0);

        let by_id = store.get(&["b".to_string(), "missing".to_string()]).await.unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].chunk.id, "b");
    }

    #[tokio::test]
    async fn memory_upsert_replaces_whole_source() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                record("a", "/kb/a.txt", 0, 3, "h1"),
                record("b", "/kb/a.txt", 1, 3, "h1"),
                record("c", "/kb/a.txt", 2, 3, "h1"),
            ])
            .await
            .unwrap();

        // Document shrank to one chunk: old indices must not survive.
        store.upsert(&[record("a", "/kb/a.txt", 0, 1, "h2")]).await.unwrap();

        let remaining = store.get_by_source("/kb/a.txt").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].chunk.content_hash, "h2");
    }

    #[tokio::test]
    async fn sqlite_roundtrip_and_replace() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::connect(&tmp.path().join("data/index.sqlite"))
            .await
            .unwrap();

        let pdf_record = IndexRecord {
            chunk: Chunk {
                id: "pdf-1".to_string(),
                source: "/kb/r.pdf".to_string(),
                kind: DocumentKind::Pdf { page: 2, total_pages: 5 },
                chunk_index: 0,
                total_chunks: 1,
                content_hash: "hash-pdf".to_string(),
                text: "page two text".to_string(),
                processed_at: Utc::now(),
            },
            embedding: vec![1.0, -2.5, 3.125],
        };

        store
            .upsert(&[record("a", "/kb/a.txt", 0, 1, "h1"), pdf_record.clone()])
            .await
            .unwrap();

        assert_eq!(store.count_sources().await.unwrap(), 2);
        assert_eq!(store.count_chunks().await.unwrap(), 2);
        assert_eq!(store.probe_dims().await.unwrap(), Some(3));

        let fetched = store.get(&["pdf-1".to_string()]).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(
            fetched[0].chunk.kind,
            DocumentKind::Pdf { page: 2, total_pages: 5 }
        );
        assert_eq!(fetched[0].embedding, vec![1.0, -2.5, 3.125]);

        // Replace shrinks the pdf source to zero chunks for that id.
        store
            .upsert(&[IndexRecord {
                chunk: Chunk {
                    id: "pdf-1b".to_string(),
                    source: "/kb/r.pdf".to_string(),
                    kind: DocumentKind::Pdf { page: 1, total_pages: 1 },
                    chunk_index: 0,
                    total_chunks: 1,
                    content_hash: "hash-pdf-2".to_string(),
                    text: "rewritten".to_string(),
                    processed_at: Utc::now(),
                },
                embedding: vec![0.5, 0.5, 0.5],
            }])
            .await
            .unwrap();

        assert!(store.get(&["pdf-1".to_string()]).await.unwrap().is_empty());
        let by_source = store.get_by_source("/kb/r.pdf").await.unwrap();
        assert_eq!(by_source.len(), 1);
        assert_eq!(by_source[0].chunk.content_hash, "hash-pdf-2");

        store.close().await;
    }

    #[tokio::test]
    async fn sqlite_clear_and_delete() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::connect(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();

        store
            .upsert(&[record("a", "/kb/a.txt", 0, 1, "h1"), record("b", "/kb/b.txt", 0, 1, "h2")])
            .await
            .unwrap();

        assert_eq!(store.delete_by_source("/kb/a.txt").await.unwrap(), 1);
        assert_eq!(store.count_chunks().await.unwrap(), 1);

        store.clear().await.unwrap();
        assert_eq!(store.count_chunks().await.unwrap(), 0);
        assert_eq!(store.probe_dims().await.unwrap(), None);

        store.close().await;
    }

    #[tokio::test]
    async fn sqlite_persists_across_connections() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");

        {
            let store = SqliteStore::connect(&path).await.unwrap();
            store.upsert(&[record("a", "/kb/a.txt", 0, 1, "h1")]).await.unwrap();
            store.close().await;
        }

        let reopened = SqliteStore::connect(&path).await.unwrap();
        assert_eq!(reopened.count_chunks().await.unwrap(), 1);
        reopened.close().await;
    }
}
