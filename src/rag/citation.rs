//! Citation mapping from retrieved chunks back to their sources.

use super::RetrievalHit;
use crate::chunking::Chunk;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Character span of one cited chunk within its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub sequence_index: u32,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// One cited source and the chunks that support it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub source_id: String,
    pub display_label: String,
    pub url: Option<String>,
    /// Ascending by `sequence_index`, not by retrieval rank.
    pub chunk_ids: Vec<Uuid>,
    /// Parallel to `chunk_ids`.
    pub spans: Vec<Span>,
    pub best_rank: usize,
}

/// Group chunk hits by source, ordered by best rank then source id.
pub fn map_citations(hits: &[RetrievalHit<Chunk>]) -> Vec<Citation> {
    let mut groups: BTreeMap<&str, Vec<&RetrievalHit<Chunk>>> = BTreeMap::new();
    for hit in hits {
        groups.entry(hit.item.source_id.as_str()).or_default().push(hit);
    }

    let mut citations: Vec<Citation> = groups
        .into_iter()
        .map(|(source_id, mut group)| {
            let best_rank = group.iter().map(|h| h.rank).min().unwrap_or_default();
            group.sort_by_key(|h| (h.item.sequence_index, h.rank));
            group.dedup_by_key(|h| h.item.sequence_index);

            let first = &group[0].item;
            Citation {
                source_id: source_id.to_string(),
                display_label: first.display_label(),
                url: first.url.clone(),
                chunk_ids: group.iter().map(|h| h.item.id).collect(),
                spans: group
                    .iter()
                    .map(|h| Span {
                        sequence_index: h.item.sequence_index,
                        start_offset: h.item.start_offset,
                        end_offset: h.item.end_offset,
                    })
                    .collect(),
                best_rank,
            }
        })
        .collect();

    citations.sort_by(|a, b| {
        a.best_rank
            .cmp(&b.best_rank)
            .then_with(|| a.source_id.cmp(&b.source_id))
    });
    citations
}

/// Chunks in citation order: sources by best rank, chunks by position.
pub fn chunks_in_citation_order<'a>(
    citations: &[Citation],
    hits: &'a [RetrievalHit<Chunk>],
) -> Vec<&'a Chunk> {
    citations
        .iter()
        .flat_map(|citation| {
            citation
                .chunk_ids
                .iter()
                .filter_map(|id| hits.iter().find(|h| h.item.id == *id).map(|h| &h.item))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(source_id: &str, sequence_index: u32, rank: usize) -> RetrievalHit<Chunk> {
        let start = sequence_index as usize * 800;
        RetrievalHit {
            item: Chunk {
                id: Chunk::derive_id(source_id, sequence_index),
                source_id: source_id.to_string(),
                sequence_index,
                text: format!("{} chunk {}", source_id, sequence_index),
                start_offset: start,
                end_offset: start + 1000,
                title: None,
                url: None,
            },
            distance: rank as f32 * 0.1,
            rank,
        }
    }

    #[test]
    fn test_groups_by_source_with_best_rank() {
        let hits = vec![hit("v1", 0, 0), hit("v1", 1, 2), hit("v2", 0, 1)];
        let citations = map_citations(&hits);

        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].source_id, "v1");
        assert_eq!(citations[0].best_rank, 0);
        assert_eq!(citations[0].chunk_ids.len(), 2);
        assert_eq!(citations[1].source_id, "v2");
        assert_eq!(citations[1].best_rank, 1);
    }

    #[test]
    fn test_chunk_ids_follow_sequence_not_rank() {
        let hits = vec![hit("v1", 5, 0), hit("v1", 2, 1), hit("v1", 9, 2)];
        let citations = map_citations(&hits);

        assert_eq!(citations.len(), 1);
        let order: Vec<u32> = citations[0].spans.iter().map(|s| s.sequence_index).collect();
        assert_eq!(order, vec![2, 5, 9]);
        assert_eq!(citations[0].chunk_ids[0], Chunk::derive_id("v1", 2));
        assert_eq!(citations[0].spans[0].start_offset, 1600);
    }

    #[test]
    fn test_ties_broken_by_source_id() {
        let mut b = hit("b", 0, 0);
        let mut a = hit("a", 0, 0);
        b.rank = 3;
        a.rank = 3;
        let citations = map_citations(&[b, a]);
        assert_eq!(citations[0].source_id, "a");
        assert_eq!(citations[1].source_id, "b");
    }

    #[test]
    fn test_label_falls_back_to_source_id() {
        let mut titled = hit("v1", 0, 0);
        titled.item.title = Some("Intro to ML".to_string());
        let citations = map_citations(&[titled, hit("v2", 0, 1)]);
        assert_eq!(citations[0].display_label, "Intro to ML");
        assert_eq!(citations[1].display_label, "v2");
    }

    #[test]
    fn test_chunks_in_citation_order() {
        let hits = vec![hit("v2", 0, 0), hit("v1", 3, 1), hit("v1", 1, 2)];
        let citations = map_citations(&hits);
        let ordered: Vec<(&str, u32)> = chunks_in_citation_order(&citations, &hits)
            .iter()
            .map(|c| (c.source_id.as_str(), c.sequence_index))
            .collect();
        assert_eq!(ordered, vec![("v2", 0), ("v1", 1), ("v1", 3)]);
    }

    #[test]
    fn test_no_hits_no_citations() {
        assert!(map_citations(&[]).is_empty());
    }
}
