//! Storage abstraction for case-study documents and their chunks.
//!
//! The [`Store`] trait defines every storage operation the retrieval and
//! ingestion pipeline needs, so components receive the store as an explicit
//! dependency and tests can substitute [`memory::InMemoryStore`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes and
//! must make [`Store::upsert_document`] all-or-nothing for concurrent
//! readers.

pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::filter::AttributeFilter;
use crate::models::{Chunk, DocumentAttributes, DocumentRecord, Metric, ScoredChunk};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](Store::upsert_document) | Replace a document's attributes and full chunk set |
/// | [`upsert_with_metrics`](Store::upsert_with_metrics) | Upsert plus metric replacement in one step |
/// | [`delete_document`](Store::delete_document) | Remove a document, its chunks and metrics (idempotent) |
/// | [`get_chunks_by_document`](Store::get_chunks_by_document) | Ordered chunks, optionally by section |
/// | [`replace_metrics`](Store::replace_metrics) | Replace a document's metrics |
/// | [`get_document`](Store::get_document) | Full document record |
/// | [`vector_search`](Store::vector_search) | Pre-filtered cosine similarity search |
/// | [`keyword_search`](Store::keyword_search) | Pre-filtered BM25 search |
#[async_trait]
pub trait Store: Send + Sync {
    /// Replace the attributes and the whole chunk set of `file_id`.
    ///
    /// The chunk set is deleted and re-inserted as one atomic step; it is
    /// never patched. Fails with [`Error::Validation`] when
    /// [`validate_upsert`] rejects the input.
    async fn upsert_document(
        &self,
        file_id: &str,
        attributes: &DocumentAttributes,
        chunks: &[Chunk],
    ) -> Result<()>;

    /// Upsert the document and replace its metrics together.
    ///
    /// The default runs the two steps back to back, so a failure in the
    /// second leaves the new chunks with the old metrics. Backends with
    /// transactions override this to commit both or neither.
    async fn upsert_with_metrics(
        &self,
        file_id: &str,
        attributes: &DocumentAttributes,
        chunks: &[Chunk],
        metrics: &[Metric],
    ) -> Result<()> {
        self.upsert_document(file_id, attributes, chunks).await?;
        self.replace_metrics(file_id, metrics).await
    }

    /// Remove the document, its chunks and its metrics. Missing ids are a no-op.
    async fn delete_document(&self, file_id: &str) -> Result<()>;

    /// Chunks of `file_id` ordered by `chunk_index`, restricted to
    /// `sections` (case-insensitive) when given.
    async fn get_chunks_by_document(
        &self,
        file_id: &str,
        sections: Option<&[String]>,
    ) -> Result<Vec<Chunk>>;

    /// Replace the metric set of an existing document.
    async fn replace_metrics(&self, file_id: &str, metrics: &[Metric]) -> Result<()>;

    /// The document with its ordered chunks and metrics.
    async fn get_document(&self, file_id: &str) -> Result<Option<DocumentRecord>>;

    /// Top `k` chunks by cosine similarity among chunks matching `filter`.
    async fn vector_search(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: &AttributeFilter,
    ) -> Result<Vec<ScoredChunk>>;

    /// Top `k` chunks by BM25 among chunks matching `filter`.
    async fn keyword_search(
        &self,
        query: &str,
        k: usize,
        filter: &AttributeFilter,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Reject an empty or non-finite query embedding.
pub fn validate_query_embedding(query_vec: &[f32]) -> Result<()> {
    if query_vec.is_empty() {
        return Err(Error::validation("query embedding must not be empty"));
    }
    if query_vec.iter().any(|v| !v.is_finite()) {
        return Err(Error::validation("query embedding has a non-finite component"));
    }
    Ok(())
}

/// Check an upsert before anything is written.
///
/// Rejects invalid attributes, chunks owned by another document, duplicate
/// chunk ids, empty or inconsistently sized embeddings, and chunk indices
/// that are not exactly `0..n-1`.
pub fn validate_upsert(
    file_id: &str,
    attributes: &DocumentAttributes,
    chunks: &[Chunk],
) -> Result<()> {
    if file_id.trim().is_empty() {
        return Err(Error::validation("file_id must not be empty"));
    }
    attributes.validate()?;

    let mut ids = HashSet::new();
    let mut seen_index = vec![false; chunks.len()];
    let dims = chunks.first().map(|c| c.embedding.len());

    for chunk in chunks {
        if chunk.source_document_id != file_id {
            return Err(Error::validation(format!(
                "chunk {} belongs to '{}', not '{}'",
                chunk.id, chunk.source_document_id, file_id
            )));
        }
        if !ids.insert(chunk.id.as_str()) {
            return Err(Error::validation(format!("duplicate chunk id: {}", chunk.id)));
        }
        if chunk.embedding.is_empty() {
            return Err(Error::validation(format!("chunk {} has no embedding", chunk.id)));
        }
        if chunk.embedding.iter().any(|v| !v.is_finite()) {
            return Err(Error::validation(format!(
                "chunk {} has a non-finite embedding component",
                chunk.id
            )));
        }
        if Some(chunk.embedding.len()) != dims {
            return Err(Error::validation(format!(
                "chunk {} has {} embedding dims, expected {}",
                chunk.id,
                chunk.embedding.len(),
                dims.unwrap_or(0)
            )));
        }

        let slot = usize::try_from(chunk.chunk_index)
            .ok()
            .and_then(|i| seen_index.get_mut(i))
            .ok_or_else(|| {
                Error::validation(format!(
                    "chunk_index {} outside 0..{} for '{}'",
                    chunk.chunk_index,
                    chunks.len(),
                    file_id
                ))
            })?;
        if *slot {
            return Err(Error::validation(format!(
                "chunk_index {} repeated for '{}'",
                chunk.chunk_index, file_id
            )));
        }
        *slot = true;
    }

    Ok(())
}
