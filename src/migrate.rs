//! Schema migrations.
//!
//! Every statement is idempotent, so [`run_migrations`] is safe to call on
//! each startup.
//!
//! | Table | Contents |
//! |-------|----------|
//! | `documents` | One row per case study: core attributes plus overflow JSON |
//! | `document_tech` | Tech stack, one row per technology |
//! | `chunks` | Chunk text, section, position and embedding BLOB |
//! | `chunks_fts` | FTS5 index over chunk text (`unicode61`) |
//! | `metrics` | Quantified outcomes per document |
//!
//! `*_norm` columns hold trimmed, lowercased copies used for
//! case-insensitive filtering.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            file_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            industry TEXT NOT NULL,
            industry_norm TEXT NOT NULL,
            project_type TEXT NOT NULL,
            extra_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_tech (
            file_id TEXT NOT NULL,
            technology TEXT NOT NULL,
            technology_norm TEXT NOT NULL,
            PRIMARY KEY (file_id, technology),
            FOREIGN KEY (file_id) REFERENCES documents(file_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            file_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            section TEXT,
            section_norm TEXT,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(file_id, chunk_index),
            FOREIGN KEY (file_id) REFERENCES documents(file_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id TEXT NOT NULL,
            metric_type TEXT NOT NULL,
            value REAL NOT NULL,
            unit TEXT NOT NULL,
            FOREIGN KEY (file_id) REFERENCES documents(file_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                file_id UNINDEXED,
                content,
                tokenize = 'unicode61'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_file_id ON chunks(file_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_industry ON documents(industry_norm)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_document_tech_norm ON document_tech(technology_norm)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_metrics_file_id ON metrics(file_id)")
        .execute(pool)
        .await?;

    Ok(())
}
