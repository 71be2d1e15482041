//! Single-signal ranking primitives shared by every [`Store`](crate::store::Store)
//! backend.
//!
//! Both functions take the already pre-filtered candidate set, so a top-`k`
//! request is never starved by filtering after truncation.

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ScoredChunk};
use crate::text::{query_terms, Bm25Index, Bm25Params};

/// Order by score descending, then `chunk_index` ascending, then id.
pub fn compare_scored(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

/// Rank candidates by cosine similarity to `query_vec` and keep the top `k`.
pub fn rank_by_similarity(
    candidates: impl IntoIterator<Item = Chunk>,
    query_vec: &[f32],
    k: usize,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .map(|chunk| {
            let score = cosine_similarity(query_vec, &chunk.embedding);
            ScoredChunk { chunk, score }
        })
        .collect();
    scored.sort_by(compare_scored);
    scored.truncate(k);
    scored
}

/// Rank candidates by BM25 against `query` and keep the top `k`.
///
/// Candidates sharing no token with the query are dropped.
pub fn rank_by_keyword(
    candidates: Vec<Chunk>,
    query: &str,
    k: usize,
    params: Bm25Params,
) -> Vec<ScoredChunk> {
    let terms = query_terms(query);
    if terms.is_empty() || candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let index = Bm25Index::build(candidates.iter().map(|c| c.content.as_str()), params);
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .enumerate()
        .filter_map(|(i, chunk)| {
            index
                .score(i, &terms)
                .map(|score| ScoredChunk { chunk, score })
        })
        .collect();
    scored.sort_by(compare_scored);
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, index: i64, content: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            embedding,
            section: None,
            source_document_id: "doc".to_string(),
            chunk_index: index,
        }
    }

    #[test]
    fn test_similarity_orders_descending() {
        let candidates = vec![
            chunk("far", 0, "", vec![0.0, 1.0]),
            chunk("near", 1, "", vec![1.0, 0.1]),
            chunk("mid", 2, "", vec![1.0, 1.0]),
        ];
        let ranked = rank_by_similarity(candidates, &[1.0, 0.0], 10);
        let ids: Vec<&str> = ranked.iter().map(|s| s.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
    }

    #[test]
    fn test_similarity_ties_break_on_chunk_index() {
        let candidates = vec![
            chunk("b", 3, "", vec![1.0, 0.0]),
            chunk("a", 1, "", vec![2.0, 0.0]),
        ];
        let ranked = rank_by_similarity(candidates, &[1.0, 0.0], 10);
        assert_eq!(ranked[0].chunk.chunk_index, 1);
        assert_eq!(ranked[1].chunk.chunk_index, 3);
    }

    #[test]
    fn test_similarity_truncates_to_k() {
        let candidates = (0..5).map(|i| chunk(&format!("c{}", i), i, "", vec![1.0, i as f32]));
        assert_eq!(rank_by_similarity(candidates, &[1.0, 0.0], 2).len(), 2);
    }

    #[test]
    fn test_keyword_drops_non_matching() {
        let candidates = vec![
            chunk("a", 0, "Snowflake warehouse migration", vec![]),
            chunk("b", 1, "Patient intake chatbot", vec![]),
        ];
        let ranked = rank_by_keyword(candidates, "data warehouse", 10, Bm25Params::default());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk.id, "a");
    }

    #[test]
    fn test_keyword_stopword_query_is_empty() {
        let candidates = vec![chunk("a", 0, "the warehouse", vec![])];
        assert!(rank_by_keyword(candidates, "the of and", 10, Bm25Params::default()).is_empty());
    }

    #[test]
    fn test_non_finite_embeddings_sort_without_panic() {
        let candidates: Vec<Chunk> = (0..64)
            .map(|i| {
                let embedding = if i % 3 == 0 {
                    vec![f32::NAN, 1.0]
                } else {
                    vec![1.0, i as f32]
                };
                chunk(&format!("c{:02}", i), i, "text", embedding)
            })
            .collect();
        let ranked = rank_by_similarity(candidates, &[1.0, 0.5], 10);
        assert_eq!(ranked.len(), 10);
        assert!(ranked.iter().all(|r| r.score.is_finite()));
        assert!(ranked.windows(2).all(|w| compare_scored(&w[0], &w[1]).is_le()));
    }

    #[test]
    fn test_compare_scored_is_total_with_nan() {
        let mut scored: Vec<ScoredChunk> = (0..40)
            .map(|i| ScoredChunk {
                chunk: chunk(&format!("c{:02}", i), i, "", vec![1.0]),
                score: if i % 4 == 0 { f64::NAN } else { i as f64 },
            })
            .collect();
        scored.sort_by(compare_scored);
        assert_eq!(scored.len(), 40);
    }
}
