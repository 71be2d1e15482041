//! # Proposal Writer Core
//!
//! Storage-agnostic retrieval and review logic for the proposal writer:
//! data models, the [`Store`] abstraction with an in-memory backend,
//! tokenization and BM25, vector and keyword ranking, Reciprocal Rank
//! Fusion, the filtered search façade, the rule-based evaluator, and the
//! bounded generation-review loop.
//!
//! This crate contains no sqlx, HTTP client, or filesystem dependencies.
//! Embedding and generation are reached through the traits in
//! [`services`].

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod fusion;
pub mod metrics;
pub mod models;
pub mod ranking;
pub mod review;
pub mod search;
pub mod services;
pub mod store;
pub mod text;
pub mod workflow;

pub use error::{Error, Result};
pub use filter::AttributeFilter;
pub use fusion::{reciprocal_rank_fusion, FusionParams};
pub use models::{
    Check, Chunk, Document, DocumentAttributes, DocumentRecord, GeneratedContent, Issue, Metric,
    ProjectType, ReviewResult, ScoredChunk, SearchResult, Severity,
};
pub use review::{ContentType, Evaluator, ReviewInput, Reviewer, ScoringConfig, WordRange};
pub use search::{search, Retriever, SearchFilters, SearchParams, SearchRequest};
pub use services::{Embedder, GenerationContext, Generator};
pub use store::memory::InMemoryStore;
pub use store::Store;
pub use workflow::{LoopOutcome, LoopState, Outcome, ReviewLoop};
