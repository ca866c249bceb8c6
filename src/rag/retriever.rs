//! Nearest-neighbour retrieval over transcripts and courses.

use crate::catalog::CourseRecord;
use crate::chunking::Chunk;
use crate::embedding::EmbeddingGateway;
use crate::error::Result;
use crate::vector_store::{
    chunk_from_record, course_from_record, Collection, MetadataFilter, Record, StoredHit,
    VectorStore,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// One ranked result of a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit<T> {
    pub item: T,
    /// Cosine distance; lower is closer.
    pub distance: f32,
    /// 0-based position in the returned ordering.
    pub rank: usize,
}

impl<T> RetrievalHit<T> {
    /// Similarity score, `1 - distance`.
    pub fn relevance(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Embeds queries and looks them up in the store.
#[derive(Clone)]
pub struct Retriever {
    gateway: Arc<EmbeddingGateway>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(gateway: Arc<EmbeddingGateway>, store: Arc<dyn VectorStore>) -> Self {
        Self { gateway, store }
    }

    /// Embed a query once so it can serve both collections.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.gateway.embed(query).await
    }

    /// Top-`k` transcript chunks for `query`.
    #[instrument(skip(self))]
    pub async fn retrieve_transcripts(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit<Chunk>>> {
        let vector = self.embed_query(query).await?;
        self.transcripts_for_vector(&vector, k, None).await
    }

    /// Top-`k` courses for `query`.
    #[instrument(skip(self))]
    pub async fn retrieve_courses(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit<CourseRecord>>> {
        let vector = self.embed_query(query).await?;
        self.courses_for_vector(&vector, k).await
    }

    /// Top-`k` transcript chunks for an already embedded query.
    pub async fn transcripts_for_vector(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit<Chunk>>> {
        let hits = self
            .store
            .query(Collection::Transcripts, vector, k, filter)
            .await?;
        debug!("Retrieved {} transcript hits", hits.len());
        to_hits(hits, chunk_from_record)
    }

    /// Top-`k` courses for an already embedded query.
    pub async fn courses_for_vector(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalHit<CourseRecord>>> {
        let hits = self.store.query(Collection::Courses, vector, k, None).await?;
        debug!("Retrieved {} course hits", hits.len());
        to_hits(hits, course_from_record)
    }
}

fn to_hits<T>(
    hits: Vec<StoredHit>,
    decode: impl Fn(&Record) -> Result<T>,
) -> Result<Vec<RetrievalHit<T>>> {
    hits.iter()
        .enumerate()
        .map(|(rank, hit)| {
            Ok(RetrievalHit {
                item: decode(&hit.record)?,
                distance: hit.distance,
                rank,
            })
        })
        .collect()
}
