//! SQLite backend tests against a throwaway on-disk database.

use std::sync::Arc;

use tempfile::TempDir;

use proposal_writer::config::DbConfig;
use proposal_writer::db;
use proposal_writer::migrate::run_migrations;
use proposal_writer::sqlite_store::SqliteStore;
use proposal_writer_core::{
    search, AttributeFilter, Chunk, DocumentAttributes, Error, Metric, ProjectType, SearchParams,
    SearchRequest, Store,
};

async fn open_store(tmp: &TempDir) -> SqliteStore {
    let config = DbConfig {
        path: tmp.path().join("data").join("proposals.sqlite"),
    };
    let pool = db::connect(&config).await.unwrap();
    run_migrations(&pool).await.unwrap();
    SqliteStore::new(pool)
}

fn attrs(industry: &str, project_type: ProjectType, tech: &[&str]) -> DocumentAttributes {
    DocumentAttributes::new(
        format!("{} case study", industry),
        industry,
        project_type,
        tech.iter().copied(),
    )
}

fn chunk(doc: &str, index: i64, section: &str, content: &str, embedding: Vec<f32>) -> Chunk {
    Chunk {
        id: format!("{}#{}", doc, index),
        content: content.to_string(),
        embedding,
        section: Some(section.to_string()),
        source_document_id: doc.to_string(),
        chunk_index: index,
    }
}

/// Two e-commerce documents and one healthcare document.
async fn seed(store: &SqliteStore) {
    store
        .upsert_document(
            "shopco",
            &attrs("E-commerce", ProjectType::DataEngineering, &["Snowflake", "dbt"]),
            &[
                chunk("shopco", 0, "context", "Order data lived in spreadsheets", vec![0.9, 0.1, 0.0]),
                chunk("shopco", 1, "results", "Snowflake warehouse cut reporting time", vec![1.0, 0.0, 0.0]),
            ],
        )
        .await
        .unwrap();
    store
        .upsert_document(
            "cartly",
            &attrs("e-commerce", ProjectType::BiAnalytics, &["Looker"]),
            &[chunk("cartly", 0, "results", "Looker dashboards for the warehouse team", vec![0.7, 0.7, 0.0])],
        )
        .await
        .unwrap();
    store
        .upsert_document(
            "clinic",
            &attrs("Healthcare", ProjectType::DataEngineering, &["Snowflake", "Python"]),
            &[chunk("clinic", 0, "results", "Snowflake warehouse for patient intake", vec![1.0, 0.0, 0.0])],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_upsert_returns_chunks_in_index_order() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let chunks = vec![
        chunk("doc", 2, "results", "third", vec![0.0, 1.0]),
        chunk("doc", 0, "context", "first", vec![1.0, 0.0]),
        chunk("doc", 1, "solution", "second", vec![0.5, 0.5]),
    ];
    store
        .upsert_document("doc", &attrs("SaaS", ProjectType::AiMl, &["Python"]), &chunks)
        .await
        .unwrap();

    let got = store.get_chunks_by_document("doc", None).await.unwrap();
    let contents: Vec<&str> = got.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
    assert_eq!(got[1].embedding, vec![0.5, 0.5]);
    assert_eq!(got[0].section.as_deref(), Some("context"));
}

#[tokio::test]
async fn test_reupsert_replaces_chunks_and_fts_rows() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let a = attrs("SaaS", ProjectType::AiMl, &["Python"]);

    store
        .upsert_document(
            "doc",
            &a,
            &[
                chunk("doc", 0, "context", "legacy kafka pipeline", vec![1.0, 0.0]),
                chunk("doc", 1, "results", "kafka throughput doubled", vec![0.0, 1.0]),
            ],
        )
        .await
        .unwrap();
    store
        .upsert_document("doc", &a, &[chunk("doc", 0, "context", "rewritten with airflow", vec![1.0, 0.0])])
        .await
        .unwrap();

    let got = store.get_chunks_by_document("doc", None).await.unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].content, "rewritten with airflow");

    let stale = store.keyword_search("kafka", 10, &AttributeFilter::any()).await.unwrap();
    assert!(stale.is_empty());
    let fresh = store.keyword_search("airflow", 10, &AttributeFilter::any()).await.unwrap();
    assert_eq!(fresh.len(), 1);
}

#[tokio::test]
async fn test_repeated_upsert_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed(&store).await;
    let before = store.get_document("shopco").await.unwrap().unwrap();
    seed(&store).await;
    let after = store.get_document("shopco").await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_rejected_upsert_keeps_previous_version() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed(&store).await;

    let gap = vec![
        chunk("shopco", 0, "context", "x", vec![1.0, 0.0, 0.0]),
        chunk("shopco", 2, "context", "y", vec![1.0, 0.0, 0.0]),
    ];
    let err = store
        .upsert_document("shopco", &attrs("E-commerce", ProjectType::AiMl, &[]), &gap)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let doc = store.get_document("shopco").await.unwrap().unwrap();
    assert_eq!(doc.chunks.len(), 2);
    assert_eq!(doc.attributes.project_type, ProjectType::DataEngineering);
}

#[tokio::test]
async fn test_document_round_trip_with_extra_fields() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let mut a = attrs("Fintech", ProjectType::WorkflowAutomation, &["n8n", "Postgres"]);
    a.extra.insert("client".to_string(), serde_json::json!("Ledgerly"));
    a.extra.insert("duration_weeks".to_string(), serde_json::json!(6));

    store
        .upsert_document("ledger", &a, &[chunk("ledger", 0, "results", "Invoices reconciled nightly", vec![1.0])])
        .await
        .unwrap();
    store
        .replace_metrics(
            "ledger",
            &[Metric {
                metric_type: "reduction_percent".to_string(),
                value: 80.0,
                unit: "percent".to_string(),
            }],
        )
        .await
        .unwrap();

    let doc = store.get_document("ledger").await.unwrap().unwrap();
    assert_eq!(doc.attributes, a);
    assert_eq!(doc.metrics.len(), 1);
    assert_eq!(doc.metrics[0].value, 80.0);
}

#[tokio::test]
async fn test_metrics_require_document_and_survive_reupsert() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let metric = Metric {
        metric_type: "cost_savings".to_string(),
        value: 250_000.0,
        unit: "dollars".to_string(),
    };
    assert!(matches!(
        store.replace_metrics("ghost", &[metric.clone()]).await,
        Err(Error::Validation(_))
    ));

    seed(&store).await;
    store.replace_metrics("shopco", &[metric.clone()]).await.unwrap();
    seed(&store).await;
    let doc = store.get_document("shopco").await.unwrap().unwrap();
    assert_eq!(doc.metrics, vec![metric]);
}

#[tokio::test]
async fn test_delete_then_reupsert_round_trip() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed(&store).await;
    let original = store.get_document("clinic").await.unwrap().unwrap();

    store.delete_document("clinic").await.unwrap();
    store.delete_document("clinic").await.unwrap();
    assert!(store.get_document("clinic").await.unwrap().is_none());
    assert!(store.get_chunks_by_document("clinic", None).await.unwrap().is_empty());
    let hits = store.keyword_search("patient", 10, &AttributeFilter::any()).await.unwrap();
    assert!(hits.is_empty());

    store
        .upsert_document("clinic", &original.attributes, &original.chunks)
        .await
        .unwrap();
    let restored = store.get_document("clinic").await.unwrap().unwrap();
    assert_eq!(restored, original);
}

#[tokio::test]
async fn test_vector_search_excludes_filtered_industry() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed(&store).await;

    let filter = AttributeFilter {
        industry: Some("E-COMMERCE".to_string()),
        ..Default::default()
    };
    let hits = store.vector_search(&[1.0, 0.0, 0.0], 10, &filter).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.chunk.source_document_id != "clinic"));
    assert_eq!(hits[0].chunk.id, "shopco#1");
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_filters_are_conjunctive() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed(&store).await;

    let filter = AttributeFilter {
        project_type: Some(ProjectType::DataEngineering),
        technologies: Some(vec!["snowflake".to_string(), "DBT".to_string()]),
        section: Some("Results".to_string()),
        ..Default::default()
    };
    let hits = store.vector_search(&[1.0, 0.0, 0.0], 10, &filter).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
    assert_eq!(ids, vec!["shopco#1"]);

    let nobody = AttributeFilter {
        technologies: Some(vec!["Snowflake".to_string(), "Looker".to_string()]),
        ..Default::default()
    };
    assert!(store
        .keyword_search("warehouse", 10, &nobody)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_keyword_search_ranks_and_limits() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed(&store).await;

    let hits = store
        .keyword_search("the snowflake warehouse", 2, &AttributeFilter::any())
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.score > 0.0));
    assert!(hits[0].score >= hits[1].score);
    assert!(hits.iter().all(|h| h.chunk.content.contains("Snowflake")));

    let stopwords_only = store
        .keyword_search("the of and", 5, &AttributeFilter::any())
        .await
        .unwrap();
    assert!(stopwords_only.is_empty());
}

#[tokio::test]
async fn test_hybrid_search_over_sqlite() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(open_store(&tmp).await);
    seed(&store).await;

    let filters = AttributeFilter {
        industry: Some("e-commerce".to_string()),
        ..Default::default()
    };
    let req = SearchRequest {
        query_text: "snowflake warehouse reporting",
        query_embedding: &[1.0, 0.0, 0.0],
        k: 2,
        filters: &filters,
    };
    let results = search(store.as_ref(), &req, &SearchParams::default()).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.id, "shopco#1");
    assert_eq!(results[0].vector_rank, Some(1));
    assert_eq!(results[0].keyword_rank, Some(1));
    assert!(results.iter().all(|r| r.chunk.source_document_id != "clinic"));
    assert!(results[0].combined_score >= results[1].combined_score);
}

#[tokio::test]
async fn test_data_persists_across_connections() {
    let tmp = TempDir::new().unwrap();
    {
        let store = open_store(&tmp).await;
        seed(&store).await;
        store.pool().close().await;
    }
    let store = open_store(&tmp).await;
    assert!(store.get_document("cartly").await.unwrap().is_some());
}

#[tokio::test]
async fn test_non_finite_embeddings_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed(&store).await;

    let err = store
        .upsert_document(
            "nan",
            &attrs("SaaS", ProjectType::AiMl, &[]),
            &[chunk("nan", 0, "results", "broken vector", vec![f32::NAN, 1.0, 0.0])],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(store.get_document("nan").await.unwrap().is_none());

    for query in [vec![f32::NAN, 0.0, 0.0], vec![f32::INFINITY, 0.0, 0.0], vec![]] {
        let err = store
            .vector_search(&query, 5, &AttributeFilter::any())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}

#[tokio::test]
async fn test_chunk_id_owned_by_other_document_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let a = attrs("SaaS", ProjectType::AiMl, &["Python"]);

    let mut first = chunk("docA", 0, "results", "churn model in production", vec![1.0, 0.0]);
    first.id = "same".to_string();
    let mut second = chunk("docB", 0, "results", "forecasting for retail", vec![0.0, 1.0]);
    second.id = "same".to_string();

    store.upsert_document("docA", &a, &[first.clone()]).await.unwrap();
    let err = store.upsert_document("docB", &a, &[second]).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    assert!(store.get_document("docB").await.unwrap().is_none());
    let owner = store.get_document("docA").await.unwrap().unwrap();
    assert_eq!(owner.chunks, vec![first.clone()]);
    let hits = store.keyword_search("forecasting", 5, &AttributeFilter::any()).await.unwrap();
    assert!(hits.is_empty());

    // The owner may keep reusing its own ids.
    store.upsert_document("docA", &a, &[first]).await.unwrap();
}

#[tokio::test]
async fn test_upsert_with_metrics_commits_together() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed(&store).await;

    let old = Metric {
        metric_type: "reduction_percent".to_string(),
        value: 90.0,
        unit: "percent".to_string(),
    };
    store.replace_metrics("cartly", &[old.clone()]).await.unwrap();

    // Reuses a chunk id owned by shopco, so the whole write rolls back.
    let new = Metric {
        value: 35.0,
        ..old.clone()
    };
    let mut stolen = chunk("cartly", 0, "results", "rebuilt dashboards", vec![0.0, 1.0, 0.0]);
    stolen.id = "shopco#1".to_string();
    let err = store
        .upsert_with_metrics("cartly", &attrs("e-commerce", ProjectType::BiAnalytics, &["Looker"]), &[stolen], &[new.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let doc = store.get_document("cartly").await.unwrap().unwrap();
    assert_eq!(doc.metrics, vec![old]);
    assert_eq!(doc.chunks[0].content, "Looker dashboards for the warehouse team");

    store
        .upsert_with_metrics(
            "cartly",
            &attrs("e-commerce", ProjectType::BiAnalytics, &["Looker"]),
            &[chunk("cartly", 0, "results", "rebuilt dashboards", vec![0.0, 1.0, 0.0])],
            &[new.clone()],
        )
        .await
        .unwrap();
    let doc = store.get_document("cartly").await.unwrap().unwrap();
    assert_eq!(doc.metrics, vec![new]);
    assert_eq!(doc.chunks[0].content, "rebuilt dashboards");
}
