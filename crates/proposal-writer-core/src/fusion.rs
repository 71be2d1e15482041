//! Reciprocal Rank Fusion of the vector and keyword result lists.
//!
//! # Algorithm
//!
//! 1. Each input list is already ranked; ranks are 1-based.
//! 2. A chunk's fused score is `w_v / (C + rv) + w_k / (C + rk)`, where a
//!    list the chunk is absent from contributes `0`.
//! 3. The union of both lists is sorted by fused score descending, ties
//!    broken by `chunk_index` ascending then chunk id, and truncated to `k`.
//!
//! Only ranks matter, so the raw cosine and BM25 scores never need to be
//! normalised against each other. They are carried through on each
//! [`SearchResult`] for explanation.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{ScoredChunk, SearchResult};

/// RRF constants. All three are configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    /// Rank-damping constant `C`.
    pub rrf_k: f64,
    pub vector_weight: f64,
    pub keyword_weight: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            vector_weight: 1.0,
            keyword_weight: 1.0,
        }
    }
}

impl FusionParams {
    fn contribution(&self, weight: f64, rank: Option<usize>) -> f64 {
        match rank {
            Some(r) => weight / (self.rrf_k + r as f64),
            None => 0.0,
        }
    }
}

/// Fuse two ranked lists into at most `k` results.
///
/// A chunk id appearing twice in the same list keeps its best rank.
pub fn reciprocal_rank_fusion(
    vector: &[ScoredChunk],
    keyword: &[ScoredChunk],
    params: FusionParams,
    k: usize,
) -> Vec<SearchResult> {
    if k == 0 {
        return Vec::new();
    }

    let mut merged: HashMap<&str, SearchResult> = HashMap::new();

    for (i, hit) in vector.iter().enumerate() {
        merged
            .entry(hit.chunk.id.as_str())
            .or_insert_with(|| SearchResult {
                chunk: hit.chunk.clone(),
                vector_score: Some(hit.score),
                keyword_score: None,
                combined_score: 0.0,
                vector_rank: Some(i + 1),
                keyword_rank: None,
            });
    }

    for (i, hit) in keyword.iter().enumerate() {
        let entry = merged
            .entry(hit.chunk.id.as_str())
            .or_insert_with(|| SearchResult {
                chunk: hit.chunk.clone(),
                vector_score: None,
                keyword_score: None,
                combined_score: 0.0,
                vector_rank: None,
                keyword_rank: None,
            });
        if entry.keyword_rank.is_none() {
            entry.keyword_score = Some(hit.score);
            entry.keyword_rank = Some(i + 1);
        }
    }

    let mut results: Vec<SearchResult> = merged
        .into_values()
        .map(|mut r| {
            r.combined_score = params.contribution(params.vector_weight, r.vector_rank)
                + params.contribution(params.keyword_weight, r.keyword_rank);
            r
        })
        .collect();

    results.sort_by(compare_fused);
    results.truncate(k);
    results
}

fn compare_fused(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.combined_score
        .total_cmp(&a.combined_score)
        .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}
