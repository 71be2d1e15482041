//! Core data models: case-study documents, their chunks and metrics, and
//! the ephemeral search/generation/review values that flow through the
//! retrieval and review pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A unit of retrievable text belonging to one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Opaque identifier, unique across the store.
    pub id: String,
    /// Text body.
    pub content: String,
    /// Dense embedding; dimensionality is fixed per deployment.
    pub embedding: Vec<f32>,
    /// Logical part of the source document (`"context"`, `"results"`, ...).
    pub section: Option<String>,
    /// `file_id` of the owning document.
    pub source_document_id: String,
    /// Zero-based position within the owning document.
    pub chunk_index: i64,
}

/// Project categories used to classify case studies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProjectType {
    #[serde(rename = "AI_ML")]
    AiMl,
    #[serde(rename = "BI_Analytics")]
    BiAnalytics,
    #[serde(rename = "Workflow_Automation")]
    WorkflowAutomation,
    #[serde(rename = "Data_Engineering")]
    DataEngineering,
    #[serde(rename = "Web_Development")]
    WebDevelopment,
    #[serde(rename = "Mobile_App")]
    MobileApp,
    #[serde(rename = "API_Integration")]
    ApiIntegration,
    #[serde(rename = "Cloud_Migration")]
    CloudMigration,
    #[serde(rename = "Database_Optimization")]
    DatabaseOptimization,
    #[serde(rename = "ETL_Pipeline")]
    EtlPipeline,
    #[serde(rename = "Dashboard")]
    Dashboard,
    #[serde(rename = "Chatbot")]
    Chatbot,
    #[serde(rename = "Process_Automation")]
    ProcessAutomation,
    #[serde(rename = "System_Integration")]
    SystemIntegration,
    #[serde(rename = "Data_Migration")]
    DataMigration,
}

impl ProjectType {
    pub const ALL: [ProjectType; 15] = [
        ProjectType::AiMl,
        ProjectType::BiAnalytics,
        ProjectType::WorkflowAutomation,
        ProjectType::DataEngineering,
        ProjectType::WebDevelopment,
        ProjectType::MobileApp,
        ProjectType::ApiIntegration,
        ProjectType::CloudMigration,
        ProjectType::DatabaseOptimization,
        ProjectType::EtlPipeline,
        ProjectType::Dashboard,
        ProjectType::Chatbot,
        ProjectType::ProcessAutomation,
        ProjectType::SystemIntegration,
        ProjectType::DataMigration,
    ];

    /// The stored label, e.g. `"BI_Analytics"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::AiMl => "AI_ML",
            ProjectType::BiAnalytics => "BI_Analytics",
            ProjectType::WorkflowAutomation => "Workflow_Automation",
            ProjectType::DataEngineering => "Data_Engineering",
            ProjectType::WebDevelopment => "Web_Development",
            ProjectType::MobileApp => "Mobile_App",
            ProjectType::ApiIntegration => "API_Integration",
            ProjectType::CloudMigration => "Cloud_Migration",
            ProjectType::DatabaseOptimization => "Database_Optimization",
            ProjectType::EtlPipeline => "ETL_Pipeline",
            ProjectType::Dashboard => "Dashboard",
            ProjectType::Chatbot => "Chatbot",
            ProjectType::ProcessAutomation => "Process_Automation",
            ProjectType::SystemIntegration => "System_Integration",
            ProjectType::DataMigration => "Data_Migration",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = Error;

    /// Accepts the stored label case-insensitively (`"ai_ml"` → `AiMl`).
    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        ProjectType::ALL
            .iter()
            .copied()
            .find(|pt| pt.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| Error::validation(format!("unknown project type: '{}'", s)))
    }
}

/// Structured metadata of a case study.
///
/// The four core fields are validated at ingestion; `extra` carries any
/// additional frontmatter keys and is stored without inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAttributes {
    pub industry: String,
    pub project_type: ProjectType,
    #[serde(default)]
    pub tech_stack: BTreeSet<String>,
    pub title: String,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DocumentAttributes {
    pub fn new(
        title: impl Into<String>,
        industry: impl Into<String>,
        project_type: ProjectType,
        tech_stack: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            industry: industry.into(),
            project_type,
            tech_stack: tech_stack.into_iter().map(Into::into).collect(),
            title: title.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Check the core fields. Overflow fields are left opaque.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("document title must not be empty"));
        }
        if self.industry.trim().is_empty() {
            return Err(Error::validation("document industry must not be empty"));
        }
        if self.tech_stack.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::validation("tech_stack entries must not be empty"));
        }
        Ok(())
    }
}

/// A logical source (case study, capability deck).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub attributes: DocumentAttributes,
}

/// A quantified outcome attached to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// e.g. `"error_reduction"`.
    pub metric_type: String,
    pub value: f64,
    /// e.g. `"percent"`, `"dollars"`.
    pub unit: String,
}

/// A document with its full chunk sequence and metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub file_id: String,
    pub attributes: DocumentAttributes,
    /// Ordered by `chunk_index`.
    pub chunks: Vec<Chunk>,
    pub metrics: Vec<Metric>,
}

/// A chunk paired with the raw score of a single search signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// A fused search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Cosine similarity, absent when the chunk only matched by keyword.
    pub vector_score: Option<f64>,
    /// BM25 relevance, absent when the chunk only matched by vector.
    pub keyword_score: Option<f64>,
    /// Reciprocal-rank-fusion score.
    pub combined_score: f64,
    /// 1-based rank in the vector list.
    pub vector_rank: Option<usize>,
    /// 1-based rank in the keyword list.
    pub keyword_rank: Option<usize>,
}

/// Output of one generation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub body: String,
    pub word_count: usize,
    pub referenced_chunk_ids: BTreeSet<String>,
}

impl GeneratedContent {
    /// Build content, deriving `word_count` from whitespace-separated words.
    pub fn new(
        body: impl Into<String>,
        referenced_chunk_ids: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let body = body.into();
        let word_count = body.split_whitespace().count();
        Self {
            body,
            word_count,
            referenced_chunk_ids: referenced_chunk_ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// The four weighted review criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Length,
    Specificity,
    Personalization,
    Structure,
}

impl Check {
    pub fn as_str(&self) -> &'static str {
        match self {
            Check::Length => "length",
            Check::Specificity => "specificity",
            Check::Personalization => "personalization",
            Check::Structure => "structure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// One actionable problem found by the reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub category: String,
    pub description: String,
    pub suggested_fix: String,
    pub severity: Severity,
}

/// Outcome of scoring one piece of generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    /// 0.0 – 10.0.
    pub score: f64,
    pub passed_checks: BTreeSet<Check>,
    pub failed_checks: BTreeSet<Check>,
    pub issues: Vec<Issue>,
}
