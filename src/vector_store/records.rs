//! Conversions between domain types and stored records.

use super::Record;
use crate::catalog::CourseRecord;
use crate::chunking::Chunk;
use crate::error::{Result, SvarError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize)]
struct ChunkMetadata {
    source_id: String,
    sequence_index: u32,
    start_offset: usize,
    end_offset: usize,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct CourseMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    catalog: String,
    #[serde(default)]
    raw_fields: BTreeMap<String, String>,
}

fn to_map<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(SvarError::Store("Metadata must be an object".to_string())),
    }
}

fn from_map<T: for<'de> Deserialize<'de>>(record: &Record) -> Result<T> {
    serde_json::from_value(Value::Object(record.metadata.clone())).map_err(|e| {
        SvarError::Store(format!("Corrupt metadata on record {}: {}", record.id, e))
    })
}

/// Store record for a transcript chunk. The chunk text is the document.
pub fn chunk_record(chunk: &Chunk, vector: Vec<f32>) -> Result<Record> {
    let metadata = to_map(&ChunkMetadata {
        source_id: chunk.source_id.clone(),
        sequence_index: chunk.sequence_index,
        start_offset: chunk.start_offset,
        end_offset: chunk.end_offset,
        title: chunk.title.clone(),
        url: chunk.url.clone(),
    })?;
    Ok(Record::new(chunk.id, chunk.text.clone(), metadata, vector))
}

/// Rebuild a chunk from its stored record.
pub fn chunk_from_record(record: &Record) -> Result<Chunk> {
    let meta: ChunkMetadata = from_map(record)?;
    Ok(Chunk {
        id: record.id,
        source_id: meta.source_id,
        sequence_index: meta.sequence_index,
        text: record.document.clone(),
        start_offset: meta.start_offset,
        end_offset: meta.end_offset,
        title: meta.title,
        url: meta.url,
    })
}

/// Store record for a course. The document is the text that was embedded.
pub fn course_record(course: &CourseRecord, vector: Vec<f32>) -> Result<Record> {
    let metadata = to_map(&CourseMetadata {
        name: course.name.clone(),
        url: course.url.clone(),
        catalog: course.catalog.clone(),
        raw_fields: course.raw_fields.clone(),
    })?;
    Ok(Record::new(course.id, course.embedding_text(), metadata, vector))
}

/// Rebuild a course from its stored record.
pub fn course_from_record(record: &Record) -> Result<CourseRecord> {
    let meta: CourseMetadata = from_map(record)?;
    Ok(CourseRecord {
        id: record.id,
        name: meta.name,
        url: meta.url,
        catalog: meta.catalog,
        raw_fields: meta.raw_fields,
    })
}
