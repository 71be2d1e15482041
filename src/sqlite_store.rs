//! SQLite-backed [`Store`] implementation.
//!
//! Attribute filters are pushed into SQL so ranking only ever sees the
//! pre-filtered candidate set. Keyword relevance comes from the FTS5
//! `bm25()` auxiliary function; vector similarity is computed in Rust over
//! the stored embedding BLOBs.
//!
//! Plumbing errors are `anyhow` internally and surface as
//! [`Error::Storage`] at the trait boundary.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};

use proposal_writer_core::embedding::{blob_to_vec, vec_to_blob};
use proposal_writer_core::ranking::{compare_scored, rank_by_similarity};
use proposal_writer_core::store::{validate_query_embedding, validate_upsert};
use proposal_writer_core::text::query_terms;
use proposal_writer_core::{
    AttributeFilter, Chunk, DocumentAttributes, DocumentRecord, Error, Metric, ProjectType,
    Result, ScoredChunk, Store,
};

const CHUNK_COLUMNS: &str =
    "c.id, c.file_id, c.chunk_index, c.section, c.content, c.embedding";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace the document (and its metrics, when given) in one
    /// transaction. Returns the first chunk id already owned by another
    /// document, in which case nothing is written.
    async fn write_document(
        &self,
        file_id: &str,
        attributes: &DocumentAttributes,
        chunks: &[Chunk],
        metrics: Option<&[Metric]>,
    ) -> anyhow::Result<Option<IdConflict>> {
        let extra_json = serde_json::to_string(&attributes.extra)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (file_id, title, industry, industry_norm, project_type, extra_json)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                title = excluded.title,
                industry = excluded.industry,
                industry_norm = excluded.industry_norm,
                project_type = excluded.project_type,
                extra_json = excluded.extra_json
            "#,
        )
        .bind(file_id)
        .bind(&attributes.title)
        .bind(&attributes.industry)
        .bind(normalize(&attributes.industry))
        .bind(attributes.project_type.as_str())
        .bind(&extra_json)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM document_tech WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        for tech in &attributes.tech_stack {
            sqlx::query(
                "INSERT INTO document_tech (file_id, technology, technology_norm) VALUES (?, ?, ?)",
            )
            .bind(file_id)
            .bind(tech)
            .bind(normalize(tech))
            .execute(&mut *tx)
            .await?;
        }

        // The chunk set is replaced wholesale, never patched
        sqlx::query("DELETE FROM chunks_fts WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            let owner: Option<String> =
                sqlx::query_scalar("SELECT file_id FROM chunks WHERE id = ?")
                    .bind(&chunk.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if let Some(owner) = owner {
                return Ok(Some(IdConflict {
                    chunk_id: chunk.id.clone(),
                    owner,
                }));
            }

            sqlx::query(
                r#"
                INSERT INTO chunks (id, file_id, chunk_index, section, section_norm, content, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(file_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.section)
            .bind(chunk.section.as_deref().map(normalize))
            .bind(&chunk.content)
            .bind(vec_to_blob(&chunk.embedding))
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, file_id, content) VALUES (?, ?, ?)")
                .bind(&chunk.id)
                .bind(file_id)
                .bind(&chunk.content)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(metrics) = metrics {
            insert_metrics(&mut tx, file_id, metrics).await?;
        }

        tx.commit().await?;
        Ok(None)
    }

    async fn remove_document(&self, file_id: &str) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks_fts WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        for table in ["metrics", "chunks", "document_tech", "documents"] {
            sqlx::query(&format!("DELETE FROM {} WHERE file_id = ?", table))
                .bind(file_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_chunks(
        &self,
        file_id: &str,
        sections: Option<&[String]>,
    ) -> anyhow::Result<Vec<Chunk>> {
        if sections.is_some_and(|s| s.is_empty()) {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        qb.push(CHUNK_COLUMNS);
        qb.push(" FROM chunks c WHERE c.file_id = ");
        qb.push_bind(file_id.to_string());
        if let Some(sections) = sections {
            qb.push(" AND c.section_norm IN (");
            let mut separated = qb.separated(", ");
            for section in sections {
                separated.push_bind(normalize(section));
            }
            separated.push_unseparated(")");
        }
        qb.push(" ORDER BY c.chunk_index ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(chunk_from_row).collect()
    }

    /// Replace metrics; `false` when the document does not exist.
    async fn write_metrics(&self, file_id: &str, metrics: &[Metric]) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM documents WHERE file_id = ?")
                .bind(file_id)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Ok(false);
        }

        insert_metrics(&mut tx, file_id, metrics).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn load_document(&self, file_id: &str) -> anyhow::Result<Option<DocumentRecord>> {
        let row = sqlx::query(
            "SELECT title, industry, project_type, extra_json FROM documents WHERE file_id = ?",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let project_type: String = row.try_get("project_type")?;
        let extra_json: String = row.try_get("extra_json")?;
        let tech_stack: Vec<String> = sqlx::query_scalar(
            "SELECT technology FROM document_tech WHERE file_id = ? ORDER BY technology",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        let mut attributes = DocumentAttributes::new(
            row.try_get::<String, _>("title")?,
            row.try_get::<String, _>("industry")?,
            project_type.parse::<ProjectType>()?,
            tech_stack,
        );
        attributes.extra = serde_json::from_str(&extra_json)
            .with_context(|| format!("corrupt extra_json for document '{}'", file_id))?;

        let metric_rows = sqlx::query(
            "SELECT metric_type, value, unit FROM metrics WHERE file_id = ? ORDER BY id",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        let metrics = metric_rows
            .iter()
            .map(|r| {
                Ok(Metric {
                    metric_type: r.try_get("metric_type")?,
                    value: r.try_get("value")?,
                    unit: r.try_get("unit")?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Some(DocumentRecord {
            file_id: file_id.to_string(),
            attributes,
            chunks: self.load_chunks(file_id, None).await?,
            metrics,
        }))
    }

    async fn filtered_chunks(&self, filter: &AttributeFilter) -> anyhow::Result<Vec<Chunk>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        qb.push(CHUNK_COLUMNS);
        qb.push(" FROM chunks c JOIN documents d ON d.file_id = c.file_id WHERE 1 = 1");
        push_filter(&mut qb, filter);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn fts_search(
        &self,
        terms: &[String],
        k: usize,
        filter: &AttributeFilter,
    ) -> anyhow::Result<Vec<ScoredChunk>> {
        // Quoted terms keep FTS5 from reading query syntax out of user text
        let match_expr = terms
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ");

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        qb.push(CHUNK_COLUMNS);
        qb.push(
            ", bm25(chunks_fts) AS bm25_rank FROM chunks_fts \
             JOIN chunks c ON c.id = chunks_fts.chunk_id \
             JOIN documents d ON d.file_id = c.file_id \
             WHERE chunks_fts MATCH ",
        );
        qb.push_bind(match_expr);
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY bm25_rank ASC, c.chunk_index ASC, c.id ASC LIMIT ");
        qb.push_bind(i64::try_from(k).unwrap_or(i64::MAX));

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut scored = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.try_get("bm25_rank")?;
                Ok(ScoredChunk {
                    chunk: chunk_from_row(row)?,
                    // FTS5 bm25() is lower-is-better
                    score: -rank,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        scored.sort_by(compare_scored);
        Ok(scored)
    }
}

struct IdConflict {
    chunk_id: String,
    owner: String,
}

impl IdConflict {
    fn into_error(self, file_id: &str) -> Error {
        Error::Validation(format!(
            "chunk id {} already belongs to '{}', cannot reuse it for '{}'",
            self.chunk_id, self.owner, file_id
        ))
    }
}

/// Constraint violations are caller mistakes, everything else is storage.
fn write_error(err: anyhow::Error) -> Error {
    let unique = err
        .downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation());
    if unique {
        Error::Validation(format!("duplicate chunk id: {}", err))
    } else {
        Error::Storage(err)
    }
}

/// Swap the metric set of `file_id` inside an open transaction.
async fn insert_metrics(
    tx: &mut Transaction<'_, Sqlite>,
    file_id: &str,
    metrics: &[Metric],
) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM metrics WHERE file_id = ?")
        .bind(file_id)
        .execute(&mut **tx)
        .await?;
    for metric in metrics {
        sqlx::query("INSERT INTO metrics (file_id, metric_type, value, unit) VALUES (?, ?, ?, ?)")
            .bind(file_id)
            .bind(&metric.metric_type)
            .bind(metric.value)
            .bind(&metric.unit)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Append the conjunctive filter clauses. Expects `c` (chunks) and `d`
/// (documents) aliases and a preceding `WHERE`.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AttributeFilter) {
    if let Some(industry) = &filter.industry {
        qb.push(" AND d.industry_norm = ");
        qb.push_bind(normalize(industry));
    }
    if let Some(project_type) = filter.project_type {
        qb.push(" AND d.project_type = ");
        qb.push_bind(project_type.as_str());
    }
    if let Some(techs) = &filter.technologies {
        for tech in techs {
            qb.push(
                " AND EXISTS (SELECT 1 FROM document_tech t \
                 WHERE t.file_id = d.file_id AND t.technology_norm = ",
            );
            qb.push_bind(normalize(tech));
            qb.push(")");
        }
    }
    if let Some(section) = &filter.section {
        qb.push(" AND c.section_norm = ");
        qb.push_bind(normalize(section));
    }
}

fn chunk_from_row(row: &SqliteRow) -> anyhow::Result<Chunk> {
    let blob: Vec<u8> = row.try_get("embedding")?;
    Ok(Chunk {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        embedding: blob_to_vec(&blob),
        section: row.try_get("section")?,
        source_document_id: row.try_get("file_id")?,
        chunk_index: row.try_get("chunk_index")?,
    })
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_document(
        &self,
        file_id: &str,
        attributes: &DocumentAttributes,
        chunks: &[Chunk],
    ) -> Result<()> {
        validate_upsert(file_id, attributes, chunks)?;
        if let Some(conflict) = self
            .write_document(file_id, attributes, chunks, None)
            .await
            .map_err(write_error)?
        {
            return Err(conflict.into_error(file_id));
        }
        tracing::debug!(file_id, chunks = chunks.len(), "document upserted");
        Ok(())
    }

    async fn upsert_with_metrics(
        &self,
        file_id: &str,
        attributes: &DocumentAttributes,
        chunks: &[Chunk],
        metrics: &[Metric],
    ) -> Result<()> {
        validate_upsert(file_id, attributes, chunks)?;
        if let Some(conflict) = self
            .write_document(file_id, attributes, chunks, Some(metrics))
            .await
            .map_err(write_error)?
        {
            return Err(conflict.into_error(file_id));
        }
        tracing::debug!(
            file_id,
            chunks = chunks.len(),
            metrics = metrics.len(),
            "document and metrics upserted"
        );
        Ok(())
    }

    async fn delete_document(&self, file_id: &str) -> Result<()> {
        self.remove_document(file_id).await.map_err(Error::Storage)
    }

    async fn get_chunks_by_document(
        &self,
        file_id: &str,
        sections: Option<&[String]>,
    ) -> Result<Vec<Chunk>> {
        self.load_chunks(file_id, sections)
            .await
            .map_err(Error::Storage)
    }

    async fn replace_metrics(&self, file_id: &str, metrics: &[Metric]) -> Result<()> {
        let found = self
            .write_metrics(file_id, metrics)
            .await
            .map_err(Error::Storage)?;
        if !found {
            return Err(Error::Validation(format!(
                "cannot attach metrics to unknown document '{}'",
                file_id
            )));
        }
        Ok(())
    }

    async fn get_document(&self, file_id: &str) -> Result<Option<DocumentRecord>> {
        self.load_document(file_id).await.map_err(Error::Storage)
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
        let candidates = self.filtered_chunks(filter).await.map_err(Error::Storage)?;
        Ok(rank_by_similarity(candidates, query_vec, k))
    }

    async fn keyword_search(
        &self,
        query: &str,
        k: usize,
        filter: &AttributeFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let terms = query_terms(query);
        if k == 0 || terms.is_empty() {
            return Ok(Vec::new());
        }
        self.fts_search(&terms, k, filter)
            .await
            .map_err(Error::Storage)
    }
}
