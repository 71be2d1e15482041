//! External service seams: text embedding and content generation.
//!
//! Both are traits so the retrieval and review pipeline can be driven by
//! real HTTP clients in production and by deterministic stubs in tests.
//! Implementations map their own failures onto
//! [`Error::EmbeddingUnavailable`](crate::Error::EmbeddingUnavailable) and
//! [`Error::GenerationUnavailable`](crate::Error::GenerationUnavailable);
//! retry policy lives inside the implementation or above it, never in the
//! core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{GeneratedContent, Issue};
use crate::review::{ContentType, WordRange};

/// Turns text into a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Dimensionality of returned vectors.
    fn dims(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Everything one generation attempt is allowed to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    /// Retrieved case-study chunks, already ranked.
    pub chunks: Vec<crate::models::SearchResult>,
    /// Free-form research notes about the target company.
    pub company_research: Option<String>,
    pub company_name: Option<String>,
    pub word_range: WordRange,
    /// Tone label, e.g. `"consultative"`.
    pub style: String,
    pub content_type: ContentType,
    /// The user's original request.
    pub request_text: String,
    /// Issues from a prior review; empty on the first attempt.
    #[serde(default)]
    pub feedback: Vec<Issue>,
}

impl GenerationContext {
    /// A first-attempt context using the content type's default word range.
    pub fn new(content_type: ContentType, request_text: impl Into<String>) -> Self {
        Self {
            chunks: Vec::new(),
            company_research: None,
            company_name: None,
            word_range: content_type.default_word_range(),
            style: "consultative".to_string(),
            content_type,
            request_text: request_text.into(),
            feedback: Vec::new(),
        }
    }

    /// Ids of the chunks available as evidence.
    pub fn chunk_ids(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|r| r.chunk.id.as_str())
    }
}

/// Produces a draft from a [`GenerationContext`].
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, context: &GenerationContext) -> Result<GeneratedContent>;
}
