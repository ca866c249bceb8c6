//! SQLite-based vector store implementation.
//!
//! Uses SQLite with cosine similarity computed in Rust for simplicity.
//! For production use cases with large datasets, consider using sqlite-vec extension
//! or a dedicated vector database.

use super::{
    check_dimensions, rank_records, Collection, MetadataFilter, Record, StoredHit, VectorStore,
};
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS collections (
        name TEXT PRIMARY KEY,
        dimension INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS records (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        document TEXT NOT NULL,
        metadata TEXT NOT NULL,
        embedding BLOB NOT NULL,
        indexed_at TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );

    CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection);
"#;

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open (or create) a store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Readers see the last committed upsert while a writer is active.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite vector store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite vector store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SvarError::Store(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn dimension(conn: &Connection, collection: Collection) -> Result<Option<usize>> {
        let dimension: Option<i64> = conn
            .query_row(
                "SELECT dimension FROM collections WHERE name = ?1",
                params![collection.name()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(dimension.map(|d| d as usize))
    }

    fn load_records(conn: &Connection, collection: Collection) -> Result<Vec<Record>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, document, metadata, embedding, indexed_at
            FROM records
            WHERE collection = ?1
            "#,
        )?;

        let rows = stmt.query_map(params![collection.name()], RawRow::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}

/// Column values as read, before decoding.
struct RawRow {
    id: String,
    document: String,
    metadata: String,
    embedding: Vec<u8>,
    indexed_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            document: row.get(1)?,
            metadata: row.get(2)?,
            embedding: row.get(3)?,
            indexed_at: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<Record> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| SvarError::Store(format!("Corrupt record id {}: {}", self.id, e)))?;
        let metadata: Map<String, Value> = serde_json::from_str(&self.metadata)
            .map_err(|e| SvarError::Store(format!("Corrupt metadata on record {}: {}", id, e)))?;

        Ok(Record {
            id,
            document: self.document,
            metadata,
            vector: SqliteVectorStore::bytes_to_embedding(&self.embedding),
            indexed_at: DateTime::parse_from_rfc3339(&self.indexed_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert(&self, collection: Collection, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.lock()?;
        let existing = Self::dimension(&conn, collection)?;
        let dimension = check_dimensions(existing, records)?;

        let tx = conn.unchecked_transaction()?;

        if existing.is_none() {
            if let Some(d) = dimension {
                tx.execute(
                    "INSERT INTO collections (name, dimension) VALUES (?1, ?2)",
                    params![collection.name(), d as i64],
                )?;
            }
        }

        for record in records {
            let metadata = serde_json::to_string(&record.metadata)?;
            tx.execute(
                r#"
                INSERT OR REPLACE INTO records
                (collection, id, document, metadata, embedding, indexed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    collection.name(),
                    record.id.to_string(),
                    record.document,
                    metadata,
                    Self::embedding_to_bytes(&record.vector),
                    record.indexed_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        info!("Upserted {} records into {}", records.len(), collection);
        Ok(records.len())
    }

    #[instrument(skip(self, vector, filter))]
    async fn query(
        &self,
        collection: Collection,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoredHit>> {
        let conn = self.lock()?;
        let records = Self::load_records(&conn, collection)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(expected) = Self::dimension(&conn, collection)?.filter(|d| *d != vector.len()) {
            return Err(SvarError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let hits = rank_records(records, vector, k, filter);
        debug!("Found {} matching records", hits.len());
        Ok(hits)
    }

    async fn count(&self, collection: Collection) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![collection.name()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    #[instrument(skip(self, filter))]
    async fn list(&self, collection: Collection, filter: Option<&MetadataFilter>) -> Result<Vec<Record>> {
        let conn = self.lock()?;
        let records = Self::load_records(&conn, collection)?;
        Ok(records
            .into_iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .collect())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete(&self, collection: Collection, ids: &[Uuid]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let mut deleted = 0;
        for id in ids {
            deleted += tx.execute(
                "DELETE FROM records WHERE collection = ?1 AND id = ?2",
                params![collection.name(), id.to_string()],
            )?;
        }
        tx.commit()?;

        info!("Deleted {} records from {}", deleted, collection);
        Ok(deleted)
    }
}
