//! Filtered hybrid search façade.
//!
//! The search algorithm operates entirely through the [`Store`] trait, with
//! no database or configuration dependencies. The caller supplies the query
//! embedding (or uses [`Retriever`], which owns an [`Embedder`]) and the
//! tuning [`SearchParams`].
//!
//! # Hybrid Retrieval
//!
//! 1. Validate the filters; `k == 0` short-circuits to an empty result.
//! 2. Fetch `k × over_fetch_factor` vector candidates and the same number
//!    of keyword candidates, concurrently, both pre-filtered by the store.
//! 3. Fuse the two ranked lists with [`reciprocal_rank_fusion`].
//! 4. Truncate to `k`.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::filter::AttributeFilter;
use crate::fusion::{reciprocal_rank_fusion, FusionParams};
use crate::models::SearchResult;
use crate::services::Embedder;
use crate::store::{validate_query_embedding, Store};

/// Caller-facing filter set: industry, project type, technologies, section.
pub type SearchFilters = AttributeFilter;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub fusion: FusionParams,
    /// Each primitive is asked for `k × over_fetch_factor` candidates.
    pub over_fetch_factor: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            fusion: FusionParams::default(),
            over_fetch_factor: 3,
        }
    }
}

impl SearchParams {
    fn over_fetch(&self, k: usize) -> usize {
        k.saturating_mul(self.over_fetch_factor.max(1))
    }
}

/// Bundles all inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query_text: &'a str,
    pub query_embedding: &'a [f32],
    /// Maximum results to return.
    pub k: usize,
    pub filters: &'a SearchFilters,
}

/// Run a filtered hybrid search against a [`Store`] backend.
///
/// An empty result is a success. Fails with [`Error::Validation`](crate::Error::Validation) on blank
/// filter values or an empty query embedding.
pub async fn search<S: Store + ?Sized>(
    store: &S,
    req: &SearchRequest<'_>,
    params: &SearchParams,
) -> Result<Vec<SearchResult>> {
    req.filters.validate()?;
    if req.k == 0 {
        return Ok(Vec::new());
    }
    validate_query_embedding(req.query_embedding)?;

    let over_fetch = params.over_fetch(req.k);
    let (vector, keyword) = tokio::join!(
        store.vector_search(req.query_embedding, over_fetch, req.filters),
        store.keyword_search(req.query_text, over_fetch, req.filters),
    );
    let vector = vector?;
    let keyword = keyword?;

    debug!(
        vector_candidates = vector.len(),
        keyword_candidates = keyword.len(),
        over_fetch,
        "search candidates fetched"
    );

    let results = reciprocal_rank_fusion(&vector, &keyword, params.fusion, req.k);
    info!(k = req.k, results = results.len(), "hybrid search complete");
    Ok(results)
}

/// Text-in search: embeds the query with its [`Embedder`] and delegates to
/// [`search`].
pub struct Retriever<S: ?Sized, E: ?Sized> {
    store: Arc<S>,
    embedder: Arc<E>,
    params: SearchParams,
}

impl<S, E> Retriever<S, E>
where
    S: Store + ?Sized,
    E: Embedder + ?Sized,
{
    pub fn new(store: Arc<S>, embedder: Arc<E>, params: SearchParams) -> Self {
        Self {
            store,
            embedder,
            params,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Embed `query` and run a hybrid search.
    ///
    /// Embedding failures surface unchanged, normally as
    /// [`Error::EmbeddingUnavailable`](crate::Error::EmbeddingUnavailable).
    pub async fn search_text(
        &self,
        query: &str,
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        filters.validate()?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        debug!(
            model = self.embedder.model_name(),
            dims = query_embedding.len(),
            "query embedded"
        );

        let req = SearchRequest {
            query_text: query,
            query_embedding: &query_embedding,
            k,
            filters,
        };
        search(self.store.as_ref(), &req, &self.params).await
    }
}
