//! Wiring of store, embedder and evaluator into one handle.
//!
//! [`Engine`] is what an orchestration layer holds: it ingests case
//! studies, runs filtered hybrid search, and drives the
//! generation-review loop with the configured scoring rules.

use std::sync::Arc;

use anyhow::Context;
use tokio::time::Instant;
use tracing::{debug, info};

use proposal_writer_core::chunk::chunk_sections;
use proposal_writer_core::metrics::MetricExtractor;
use proposal_writer_core::{
    ContentType, DocumentAttributes, DocumentRecord, Embedder, Evaluator, GenerationContext,
    Generator, LoopOutcome, Result, ReviewLoop, Retriever, SearchFilters, SearchResult, Store,
};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate::run_migrations;
use crate::sqlite_store::SqliteStore;

pub struct Engine {
    config: Config,
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
    retriever: Retriever<SqliteStore, dyn Embedder>,
    evaluator: Arc<Evaluator>,
    metrics: MetricExtractor,
}

impl Engine {
    /// Connect to the configured database, migrate it, and build the
    /// configured embedder.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let pool = db::connect(&config.db).await?;
        run_migrations(&pool).await?;
        let embedder = create_embedder(&config.embedding)?;
        Self::with_parts(config, Arc::new(SqliteStore::new(pool)), embedder)
    }

    /// Assemble an engine from an existing store and embedder.
    pub fn with_parts(
        config: Config,
        store: Arc<SqliteStore>,
        embedder: Arc<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        let scoring = config.review.scoring_config()?;
        let evaluator = Evaluator::new(scoring).context("invalid review rules")?;
        let retriever = Retriever::new(
            store.clone(),
            embedder.clone(),
            config.retrieval.search_params(),
        );

        Ok(Self {
            config,
            store,
            embedder,
            retriever,
            evaluator: Arc::new(evaluator),
            metrics: MetricExtractor::new()?,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn evaluator(&self) -> &Arc<Evaluator> {
        &self.evaluator
    }

    /// Chunk, embed and store `body` as document `file_id`, replacing any
    /// previous version. Returns the number of chunks written.
    ///
    /// Chunks and extracted metrics commit in one transaction. Nothing is
    /// written if validation or any embedding call fails.
    pub async fn ingest(
        &self,
        file_id: &str,
        attributes: &DocumentAttributes,
        body: &str,
    ) -> Result<usize> {
        attributes.validate()?;

        let drafts = chunk_sections(file_id, body, self.config.chunking.max_chars);
        let mut chunks = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let embedding = self.embedder.embed(&draft.content).await?;
            chunks.push(draft.into_chunk(embedding));
        }
        debug!(file_id, chunks = chunks.len(), "chunks embedded");

        let metrics = self.metrics.extract(body);
        self.store
            .upsert_with_metrics(file_id, attributes, &chunks, &metrics)
            .await?;

        info!(
            file_id,
            chunks = chunks.len(),
            metrics = metrics.len(),
            "document ingested"
        );
        Ok(chunks.len())
    }

    pub async fn delete_document(&self, file_id: &str) -> Result<()> {
        self.store.delete_document(file_id).await
    }

    pub async fn get_document(&self, file_id: &str) -> Result<Option<DocumentRecord>> {
        self.store.get_document(file_id).await
    }

    /// Hybrid search for `query`; `k` defaults to `retrieval.final_limit`.
    pub async fn search(
        &self,
        query: &str,
        k: Option<usize>,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        let k = k.unwrap_or(self.config.retrieval.final_limit);
        self.retriever.search_text(query, k, filters).await
    }

    /// A first-attempt generation context grounded in a search for
    /// `request_text`, with the configured word range for `content_type`.
    pub async fn prepare_context(
        &self,
        content_type: ContentType,
        request_text: &str,
        filters: &SearchFilters,
    ) -> Result<GenerationContext> {
        let mut context = GenerationContext::new(content_type, request_text);
        context.word_range = self.evaluator.config().word_range(content_type);
        context.chunks = self.search(request_text, None, filters).await?;
        Ok(context)
    }

    /// A review loop using `generator` and the configured threshold.
    pub fn review_loop<G>(&self, generator: Arc<G>) -> ReviewLoop<G, Evaluator>
    where
        G: Generator + ?Sized,
    {
        ReviewLoop::new(generator, self.evaluator.clone())
            .with_threshold(self.config.review.threshold)
    }

    /// Run the bounded generate-review loop over `context`.
    pub async fn draft<G>(
        &self,
        generator: Arc<G>,
        context: GenerationContext,
        deadline: Option<Instant>,
    ) -> Result<LoopOutcome>
    where
        G: Generator + ?Sized,
    {
        self.review_loop(generator).run(context, deadline).await
    }
}
