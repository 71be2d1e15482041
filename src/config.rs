//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/proposals.sqlite"
//!
//! [retrieval]
//! rrf_k = 60.0
//! keyword_weight = 1.2
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [review]
//! threshold = 8.0
//! forbidden_phrases = ["synerg*"]
//!
//! [review.word_ranges.proposal]
//! min = 150
//! max = 300
//! ```
//!
//! Every section except `[db]` is optional and falls back to defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use proposal_writer_core::{ContentType, FusionParams, ScoringConfig, SearchParams, WordRange};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_over_fetch_factor")]
    pub over_fetch_factor: usize,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            vector_weight: default_weight(),
            keyword_weight: default_weight(),
            over_fetch_factor: default_over_fetch_factor(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_rrf_k() -> f64 {
    60.0
}
fn default_weight() -> f64 {
    1.0
}
fn default_over_fetch_factor() -> usize {
    3
}
fn default_final_limit() -> usize {
    5
}

impl RetrievalConfig {
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            fusion: FusionParams {
                rrf_k: self.rrf_k,
                vector_weight: self.vector_weight,
                keyword_weight: self.keyword_weight,
            },
            over_fetch_factor: self.over_fetch_factor,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Ollama server; ignored by other providers.
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: default_ollama_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReviewConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub forbidden_phrases: Vec<String>,
    #[serde(default)]
    pub required_elements: Vec<String>,
    /// Per-content-type overrides, keyed `proposal`, `outreach_email`, `rfp_response`.
    #[serde(default)]
    pub word_ranges: BTreeMap<ContentType, WordRange>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            forbidden_phrases: Vec::new(),
            required_elements: Vec::new(),
            word_ranges: BTreeMap::new(),
        }
    }
}

fn default_threshold() -> f64 {
    8.0
}

impl ReviewConfig {
    pub fn scoring_config(&self) -> Result<ScoringConfig> {
        let mut scoring = ScoringConfig::default()
            .with_forbidden_phrases(self.forbidden_phrases.iter().cloned())
            .with_required_elements(self.required_elements.iter().cloned());
        for (content_type, range) in &self.word_ranges {
            scoring = scoring.with_word_range(*content_type, range.min, range.max)?;
        }
        Ok(scoring)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    500
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate retrieval
    let retrieval = &config.retrieval;
    if retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if retrieval.rrf_k <= 0.0 {
        anyhow::bail!("retrieval.rrf_k must be > 0");
    }
    if retrieval.vector_weight < 0.0 || retrieval.keyword_weight < 0.0 {
        anyhow::bail!("retrieval weights must be non-negative");
    }
    if retrieval.vector_weight == 0.0 && retrieval.keyword_weight == 0.0 {
        anyhow::bail!("retrieval.vector_weight and retrieval.keyword_weight cannot both be 0");
    }
    if retrieval.over_fetch_factor < 1 {
        anyhow::bail!("retrieval.over_fetch_factor must be >= 1");
    }

    // Validate review
    if !(0.0..=10.0).contains(&config.review.threshold) {
        anyhow::bail!("review.threshold must be in [0.0, 10.0]");
    }
    for (content_type, range) in &config.review.word_ranges {
        if range.min >= range.max {
            anyhow::bail!(
                "review.word_ranges.{}: min ({}) must be below max ({})",
                content_type,
                range.min,
                range.max
            );
        }
    }

    // Validate chunking
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}
