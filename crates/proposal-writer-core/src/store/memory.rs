//! In-memory [`Store`] implementation for tests and embedded use.
//!
//! All state sits behind a single `std::sync::RwLock`, so an upsert or a
//! delete is observed by readers either entirely or not at all. Vector
//! search is brute-force cosine similarity; keyword search builds a BM25
//! index over the filtered candidates on each query.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::filter::AttributeFilter;
use crate::models::{Chunk, DocumentAttributes, DocumentRecord, Metric, ScoredChunk};
use crate::ranking::{rank_by_keyword, rank_by_similarity};
use crate::text::Bm25Params;

use super::{validate_query_embedding, validate_upsert, Store};

struct StoredDoc {
    attributes: DocumentAttributes,
    /// Sorted by `chunk_index`.
    chunks: Vec<Chunk>,
    metrics: Vec<Metric>,
}

#[derive(Default)]
struct State {
    docs: HashMap<String, StoredDoc>,
}

/// In-memory store.
pub struct InMemoryStore {
    state: RwLock<State>,
    bm25: Bm25Params,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_bm25(Bm25Params::default())
    }

    pub fn with_bm25(bm25: Bm25Params) -> Self {
        Self {
            state: RwLock::new(State::default()),
            bm25,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::Storage(anyhow::anyhow!("in-memory store lock poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::Storage(anyhow::anyhow!("in-memory store lock poisoned")))
    }

    /// Chunks of every document passing `filter`, cloned out of the lock.
    fn candidates(&self, filter: &AttributeFilter) -> Result<Vec<Chunk>> {
        let state = self.read()?;
        Ok(state
            .docs
            .values()
            .filter(|doc| filter.matches_document(&doc.attributes))
            .flat_map(|doc| doc.chunks.iter())
            .filter(|chunk| filter.matches_chunk(chunk))
            .cloned()
            .collect())
    }

    /// Swap in the document under one write lock. Existing metrics are
    /// kept unless `metrics` is given.
    fn put(
        &self,
        file_id: &str,
        attributes: &DocumentAttributes,
        chunks: &[Chunk],
        metrics: Option<&[Metric]>,
    ) -> Result<()> {
        validate_upsert(file_id, attributes, chunks)?;

        let mut sorted = chunks.to_vec();
        sorted.sort_by_key(|c| c.chunk_index);

        let mut state = self.write()?;
        let ids: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let taken = state
            .docs
            .iter()
            .filter(|(other, _)| other.as_str() != file_id)
            .flat_map(|(other, doc)| doc.chunks.iter().map(move |c| (other, c)))
            .find(|(_, c)| ids.contains(c.id.as_str()));
        if let Some((other, c)) = taken {
            return Err(Error::Validation(format!(
                "chunk id {} already belongs to '{}'",
                c.id, other
            )));
        }

        let previous = state
            .docs
            .remove(file_id)
            .map(|old| old.metrics)
            .unwrap_or_default();
        let metrics = metrics.map(<[Metric]>::to_vec).unwrap_or(previous);
        state.docs.insert(
            file_id.to_string(),
            StoredDoc {
                attributes: attributes.clone(),
                chunks: sorted,
                metrics,
            },
        );
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_document(
        &self,
        file_id: &str,
        attributes: &DocumentAttributes,
        chunks: &[Chunk],
    ) -> Result<()> {
        self.put(file_id, attributes, chunks, None)
    }

    async fn upsert_with_metrics(
        &self,
        file_id: &str,
        attributes: &DocumentAttributes,
        chunks: &[Chunk],
        metrics: &[Metric],
    ) -> Result<()> {
        self.put(file_id, attributes, chunks, Some(metrics))
    }

    async fn delete_document(&self, file_id: &str) -> Result<()> {
        self.write()?.docs.remove(file_id);
        Ok(())
    }

    async fn get_chunks_by_document(
        &self,
        file_id: &str,
        sections: Option<&[String]>,
    ) -> Result<Vec<Chunk>> {
        let state = self.read()?;
        let doc = match state.docs.get(file_id) {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };
        Ok(doc
            .chunks
            .iter()
            .filter(|c| section_selected(c, sections))
            .cloned()
            .collect())
    }

    async fn replace_metrics(&self, file_id: &str, metrics: &[Metric]) -> Result<()> {
        let mut state = self.write()?;
        match state.docs.get_mut(file_id) {
            Some(doc) => {
                doc.metrics = metrics.to_vec();
                Ok(())
            }
            None => Err(Error::Validation(format!(
                "cannot attach metrics to unknown document '{}'",
                file_id
            ))),
        }
    }

    async fn get_document(&self, file_id: &str) -> Result<Option<DocumentRecord>> {
        let state = self.read()?;
        Ok(state.docs.get(file_id).map(|doc| DocumentRecord {
            file_id: file_id.to_string(),
            attributes: doc.attributes.clone(),
            chunks: doc.chunks.clone(),
            metrics: doc.metrics.clone(),
        }))
    }

    async fn vector_search(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: &AttributeFilter,
    ) -> Result<Vec<ScoredChunk>> {
        validate_query_embedding(query_vec)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        Ok(rank_by_similarity(self.candidates(filter)?, query_vec, k))
    }

    async fn keyword_search(
        &self,
        query: &str,
        k: usize,
        filter: &AttributeFilter,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(rank_by_keyword(self.candidates(filter)?, query, k, self.bm25))
    }
}

/// Whether `chunk` is in the requested section set (case-insensitive).
pub(crate) fn section_selected(chunk: &Chunk, sections: Option<&[String]>) -> bool {
    match sections {
        None => true,
        Some(wanted) => chunk
            .section
            .as_deref()
            .map(|s| wanted.iter().any(|w| w.eq_ignore_ascii_case(s)))
            .unwrap_or(false),
    }
}
