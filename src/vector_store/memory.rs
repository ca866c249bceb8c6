//! In-memory vector store implementation.
//!
//! Useful for testing and small datasets.

use super::{
    check_dimensions, rank_records, Collection, MetadataFilter, Record, StoredHit, VectorStore,
};
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct CollectionData {
    dimension: Option<usize>,
    records: HashMap<Uuid, Record>,
}

/// In-memory vector store.
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<Collection, CollectionData>>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Collection, CollectionData>>> {
        self.collections
            .read()
            .map_err(|e| SvarError::Store(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Collection, CollectionData>>> {
        self.collections
            .write()
            .map_err(|e| SvarError::Store(format!("Failed to acquire lock: {}", e)))
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, collection: Collection, records: &[Record]) -> Result<usize> {
        let mut collections = self.write()?;
        let data = collections.entry(collection).or_default();

        // Validate the whole batch before touching anything.
        data.dimension = check_dimensions(data.dimension, records)?;
        for record in records {
            data.records.insert(record.id, record.clone());
        }
        Ok(records.len())
    }

    async fn query(
        &self,
        collection: Collection,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoredHit>> {
        let collections = self.read()?;
        let Some(data) = collections.get(&collection).filter(|d| !d.records.is_empty()) else {
            return Ok(Vec::new());
        };

        if let Some(expected) = data.dimension.filter(|d| *d != vector.len()) {
            return Err(SvarError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        Ok(rank_records(data.records.values().cloned(), vector, k, filter))
    }

    async fn count(&self, collection: Collection) -> Result<usize> {
        let collections = self.read()?;
        Ok(collections.get(&collection).map_or(0, |d| d.records.len()))
    }

    async fn list(&self, collection: Collection, filter: Option<&MetadataFilter>) -> Result<Vec<Record>> {
        let collections = self.read()?;
        Ok(collections
            .get(&collection)
            .map(|d| {
                d.records
                    .values()
                    .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, collection: Collection, ids: &[Uuid]) -> Result<usize> {
        let mut collections = self.write()?;
        let Some(data) = collections.get_mut(&collection) else {
            return Ok(0);
        };
        Ok(ids.iter().filter(|id| data.records.remove(id).is_some()).count())
    }
}
