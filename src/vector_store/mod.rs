//! Vector store abstraction for Svar.
//!
//! Records live in named collections ([`Collection::Transcripts`] and
//! [`Collection::Courses`]). Each record is `{id, vector, metadata}` plus the
//! embedded document text. Upserts are idempotent by id, queries return hits
//! in ascending cosine distance, and querying an empty collection yields an
//! empty list rather than an error.

mod memory;
mod records;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use records::{chunk_from_record, chunk_record, course_from_record, course_record};
pub use sqlite::SqliteVectorStore;

use crate::config::Settings;
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

/// Logical collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Transcripts,
    Courses,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Transcripts => "transcripts",
            Collection::Courses => "courses",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored vector with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    /// Text that was embedded.
    pub document: String,
    pub metadata: Map<String, Value>,
    pub vector: Vec<f32>,
    pub indexed_at: DateTime<Utc>,
}

impl Record {
    pub fn new(id: Uuid, document: String, metadata: Map<String, Value>, vector: Vec<f32>) -> Self {
        Self {
            id,
            document,
            metadata,
            vector,
            indexed_at: Utc::now(),
        }
    }
}

/// Conjunction of metadata equality conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: Vec<(String, Value)>,
}

impl MetadataFilter {
    /// Match records whose `field` equals `value`.
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::default().and(field, value)
    }

    pub fn and(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| metadata.get(field) == Some(value))
    }
}

/// One nearest-neighbour result as returned by the store.
#[derive(Debug, Clone)]
pub struct StoredHit {
    pub record: Record,
    /// Cosine distance; lower is closer.
    pub distance: f32,
}

/// Trait for vector store implementations.
///
/// Implementations must let concurrent readers see either the old or the new
/// version of a record during an upsert, never a partial one.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace records by id. All vectors must share the
    /// collection's dimension.
    async fn upsert(&self, collection: Collection, records: &[Record]) -> Result<usize>;

    /// The `k` nearest records, ascending by distance. Returns fewer than
    /// `k` hits when the collection (or filter) admits fewer.
    async fn query(
        &self,
        collection: Collection,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoredHit>>;

    /// Number of records in a collection.
    async fn count(&self, collection: Collection) -> Result<usize>;

    /// All records matching `filter`, in no particular order.
    async fn list(&self, collection: Collection, filter: Option<&MetadataFilter>) -> Result<Vec<Record>>;

    /// Delete records by id, returning how many existed.
    async fn delete(&self, collection: Collection, ids: &[Uuid]) -> Result<usize>;
}

/// Open the store selected in settings.
pub fn create_store(settings: &Settings) -> Result<Arc<dyn VectorStore>> {
    match settings.vector_store.provider.as_str() {
        "sqlite" => Ok(Arc::new(SqliteVectorStore::new(&settings.sqlite_path())?)),
        "memory" => Ok(Arc::new(MemoryVectorStore::new())),
        other => Err(SvarError::Config(format!(
            "Unknown vector store provider: {}",
            other
        ))),
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Cosine distance in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Check that every record has the same dimension, matching `expected` if set.
/// Returns the batch dimension.
pub(crate) fn check_dimensions(expected: Option<usize>, records: &[Record]) -> Result<Option<usize>> {
    let mut dimension = expected;
    for record in records {
        match dimension {
            Some(d) if d != record.vector.len() => {
                return Err(SvarError::DimensionMismatch {
                    expected: d,
                    actual: record.vector.len(),
                })
            }
            Some(_) => {}
            None => dimension = Some(record.vector.len()),
        }
    }
    Ok(dimension)
}

/// Score, filter, sort and truncate candidate records.
pub(crate) fn rank_records(
    candidates: impl IntoIterator<Item = Record>,
    vector: &[f32],
    k: usize,
    filter: Option<&MetadataFilter>,
) -> Vec<StoredHit> {
    let mut hits: Vec<StoredHit> = candidates
        .into_iter()
        .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
        .map(|record| {
            let distance = cosine_distance(vector, &record.vector);
            StoredHit { record, distance }
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    hits.truncate(k);
    hits
}
