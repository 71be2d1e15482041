//! End-to-end tests of [`Engine`]: ingest, search and the draft loop over
//! a temporary SQLite database with a deterministic local embedder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use proposal_writer::config::{parse_config, Config};
use proposal_writer::db;
use proposal_writer::embedding::DisabledEmbedder;
use proposal_writer::migrate::run_migrations;
use proposal_writer::sqlite_store::SqliteStore;
use proposal_writer::Engine;
use proposal_writer_core::text::tokenize;
use proposal_writer_core::{
    AttributeFilter, Check, ContentType, DocumentAttributes, Embedder, Error, GeneratedContent,
    GenerationContext, Generator, LoopState, Outcome, ProjectType, Result,
};

const DIMS: usize = 16;

/// Hashes tokens into a fixed number of buckets.
struct BucketEmbedder;

#[async_trait]
impl Embedder for BucketEmbedder {
    fn model_name(&self) -> &str {
        "bucket-test"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vec = vec![0.0f32; DIMS];
        for token in tokenize(text) {
            let bucket = token.bytes().map(usize::from).sum::<usize>() % DIMS;
            vec[bucket] += 1.0;
        }
        Ok(vec)
    }
}

/// Returns the same body every time and counts calls.
struct RepeatGenerator {
    body: String,
    calls: AtomicUsize,
    seen_feedback: AtomicUsize,
}

impl RepeatGenerator {
    fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            calls: AtomicUsize::new(0),
            seen_feedback: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Generator for RepeatGenerator {
    async fn generate(&self, context: &GenerationContext) -> Result<GeneratedContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_feedback
            .fetch_add(context.feedback.len(), Ordering::SeqCst);
        Ok(GeneratedContent::new(&self.body, context.chunk_ids()))
    }
}

fn test_config(tmp: &TempDir, extra: &str) -> Config {
    let text = format!(
        "[db]\npath = \"{}\"\n\n[chunking]\nmax_chars = 200\n\n{}",
        tmp.path().join("proposals.sqlite").display(),
        extra
    );
    parse_config(&text).unwrap()
}

async fn engine_with(config: Config, embedder: Arc<dyn Embedder>) -> Engine {
    let pool = db::connect(&config.db).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Engine::with_parts(config, Arc::new(SqliteStore::new(pool)), embedder).unwrap()
}

const RETAIL_STUDY: &str = "\
# Context: Where they started

ShopCo ran order reporting out of spreadsheets exported nightly.

# Solution

We built a Snowflake warehouse with dbt models and Looker dashboards.

# Results: What changed

Reporting time saw a 90% reduction and the team saved $250K per year.
";

const CLINIC_STUDY: &str = "\
# Context

The clinic handled patient intake on paper forms.

# Results

A Snowflake warehouse now feeds intake dashboards, 40% faster triage.
";

async fn seeded_engine(tmp: &TempDir, extra: &str) -> Engine {
    let engine = engine_with(test_config(tmp, extra), Arc::new(BucketEmbedder)).await;
    engine
        .ingest(
            "shopco",
            &DocumentAttributes::new("ShopCo warehouse", "E-commerce", ProjectType::DataEngineering, ["Snowflake", "dbt"]),
            RETAIL_STUDY,
        )
        .await
        .unwrap();
    engine
        .ingest(
            "clinic",
            &DocumentAttributes::new("Clinic intake", "Healthcare", ProjectType::DataEngineering, ["Snowflake"]),
            CLINIC_STUDY,
        )
        .await
        .unwrap();
    engine
}

#[tokio::test]
async fn test_ingest_stores_sections_and_metrics() {
    let tmp = TempDir::new().unwrap();
    let engine = seeded_engine(&tmp, "").await;

    let doc = engine.get_document("shopco").await.unwrap().unwrap();
    let sections: Vec<&str> = doc
        .chunks
        .iter()
        .filter_map(|c| c.section.as_deref())
        .collect();
    assert_eq!(sections, vec!["context", "solution", "results"]);
    assert!(doc.chunks.iter().all(|c| c.embedding.len() == DIMS));
    assert!(doc
        .chunks
        .iter()
        .enumerate()
        .all(|(i, c)| c.chunk_index == i as i64));

    let kinds: Vec<&str> = doc.metrics.iter().map(|m| m.metric_type.as_str()).collect();
    assert!(kinds.contains(&"reduction_percent"));
    assert!(kinds.contains(&"cost_savings"));
}

#[tokio::test]
async fn test_reingest_identical_text_is_stable() {
    let tmp = TempDir::new().unwrap();
    let engine = seeded_engine(&tmp, "").await;
    let before = engine.get_document("clinic").await.unwrap().unwrap();

    let count = engine
        .ingest("clinic", &before.attributes, CLINIC_STUDY)
        .await
        .unwrap();
    let after = engine.get_document("clinic").await.unwrap().unwrap();

    assert_eq!(count, before.chunks.len());
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_reingest_replaces_chunks_and_metrics_together() {
    let tmp = TempDir::new().unwrap();
    let engine = seeded_engine(&tmp, "").await;
    let before = engine.get_document("shopco").await.unwrap().unwrap();
    assert!(!before.metrics.is_empty());

    engine
        .ingest("shopco", &before.attributes, "# Context\n\nNo figures were published for this project.\n")
        .await
        .unwrap();
    let after = engine.get_document("shopco").await.unwrap().unwrap();
    assert_eq!(after.chunks.len(), 1);
    assert!(after.metrics.is_empty());
}

#[tokio::test]
async fn test_search_respects_industry_filter() {
    let tmp = TempDir::new().unwrap();
    let engine = seeded_engine(&tmp, "").await;

    let filters = AttributeFilter {
        industry: Some("e-commerce".to_string()),
        ..Default::default()
    };
    let results = engine
        .search("snowflake warehouse dashboards", Some(5), &filters)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.len() <= 5);
    assert!(results
        .iter()
        .all(|r| r.chunk.source_document_id == "shopco"));

    let unfiltered = engine
        .search("snowflake warehouse dashboards", None, &AttributeFilter::any())
        .await
        .unwrap();
    assert!(unfiltered
        .iter()
        .any(|r| r.chunk.source_document_id == "clinic"));
}

#[tokio::test]
async fn test_search_rejects_blank_filter() {
    let tmp = TempDir::new().unwrap();
    let engine = seeded_engine(&tmp, "").await;
    let filters = AttributeFilter {
        section: Some("  ".to_string()),
        ..Default::default()
    };
    let err = engine.search("warehouse", None, &filters).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_ingest_without_embedder_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let engine = engine_with(test_config(&tmp, ""), Arc::new(DisabledEmbedder)).await;

    let err = engine
        .ingest(
            "shopco",
            &DocumentAttributes::new("ShopCo", "E-commerce", ProjectType::Dashboard, ["Looker"]),
            RETAIL_STUDY,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    assert!(engine.get_document("shopco").await.unwrap().is_none());
}

#[tokio::test]
async fn test_draft_short_content_returns_with_issues() {
    let tmp = TempDir::new().unwrap();
    let engine = seeded_engine(&tmp, "").await;

    let context = engine
        .prepare_context(ContentType::Proposal, "Snowflake warehouse for our retail reporting", &AttributeFilter::any())
        .await
        .unwrap();
    assert!(!context.chunks.is_empty());
    assert_eq!(context.word_range.min, 150);

    let generator = Arc::new(RepeatGenerator::new("Thanks for reaching out."));
    let outcome = engine.draft(generator.clone(), context, None).await.unwrap();

    assert_eq!(outcome.status, Outcome::ReturnedWithIssues);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    assert!(generator.seen_feedback.load(Ordering::SeqCst) > 0);
    assert!(outcome.review.failed_checks.contains(&Check::Length));
    assert_eq!(outcome.states.last(), Some(&LoopState::ReturnedWithIssues));
}

#[tokio::test]
async fn test_draft_accepted_under_lenient_threshold() {
    let tmp = TempDir::new().unwrap();
    let engine = seeded_engine(&tmp, "[review]\nthreshold = 0.0\n").await;

    let context = engine
        .prepare_context(ContentType::OutreachEmail, "warehouse reporting", &AttributeFilter::any())
        .await
        .unwrap();
    let generator = Arc::new(RepeatGenerator::new("Short note."));
    let outcome = engine.draft(generator.clone(), context, None).await.unwrap();

    assert_eq!(outcome.status, Outcome::Accepted);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_configured_word_range_reaches_context() {
    let tmp = TempDir::new().unwrap();
    let engine = seeded_engine(&tmp, "[review.word_ranges.proposal]\nmin = 50\nmax = 120\n").await;
    let context = engine
        .prepare_context(ContentType::Proposal, "warehouse", &AttributeFilter::any())
        .await
        .unwrap();
    assert_eq!(context.word_range.min, 50);
    assert_eq!(context.word_range.max, 120);
}
