//! Rule-based scoring of generated content.
//!
//! # Checks
//!
//! | Check | Weight | Passes when |
//! |-------|--------|-------------|
//! | Specificity | 0.4 | a numeral sits next to `%`, a currency symbol, or a unit word |
//! | Personalization | 0.3 | the company is named at least twice, or (no company) the body shares a term with the request |
//! | Structure | 0.2 | a call to action is present, no forbidden phrase is used, every required element appears |
//! | Length | 0.1 | `word_count` is inside the content type's range |
//!
//! The score is `Σ weight × passed × 10`, clamped to `[0, 10]`. Every
//! failing check contributes at least one [`Issue`] that a regeneration can
//! act on.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Check, GeneratedContent, Issue, ReviewResult, Severity};
use crate::services::GenerationContext;
use crate::text::tokenize;

/// Kind of content being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Proposal,
    OutreachEmail,
    RfpResponse,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Proposal => "proposal",
            ContentType::OutreachEmail => "outreach_email",
            ContentType::RfpResponse => "rfp_response",
        }
    }

    pub fn default_word_range(&self) -> WordRange {
        match self {
            ContentType::Proposal => WordRange { min: 150, max: 300 },
            ContentType::OutreachEmail => WordRange { min: 100, max: 200 },
            ContentType::RfpResponse => WordRange { min: 300, max: 1000 },
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive word-count bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRange {
    pub min: usize,
    pub max: usize,
}

impl WordRange {
    /// Fails with [`Error::Validation`] unless `min < max`.
    pub fn new(min: usize, max: usize) -> Result<Self> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min >= self.max {
            return Err(Error::validation(format!(
                "word range min ({}) must be below max ({})",
                self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn contains(&self, words: usize) -> bool {
        words >= self.min && words <= self.max
    }
}

/// Relative weight of each check. Should sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckWeights {
    pub specificity: f64,
    pub personalization: f64,
    pub structure: f64,
    pub length: f64,
}

impl Default for CheckWeights {
    fn default() -> Self {
        Self {
            specificity: 0.4,
            personalization: 0.3,
            structure: 0.2,
            length: 0.1,
        }
    }
}

impl CheckWeights {
    fn weight(&self, check: Check) -> f64 {
        match check {
            Check::Specificity => self.specificity,
            Check::Personalization => self.personalization,
            Check::Structure => self.structure,
            Check::Length => self.length,
        }
    }
}

/// Call-to-action phrases recognised by the structure check.
pub const CTA_PHRASES: &[&str] = &[
    "schedule",
    "discuss",
    "connect",
    "reach out",
    "meeting",
    "call",
    "chat",
    "let's talk",
    "book a time",
];

/// Caller-tunable evaluator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    word_ranges: BTreeMap<ContentType, WordRange>,
    pub forbidden_phrases: Vec<String>,
    /// Regular expressions (case-insensitive) that must all match the body.
    pub required_elements: Vec<String>,
    pub cta_phrases: Vec<String>,
    pub weights: CheckWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            word_ranges: BTreeMap::new(),
            forbidden_phrases: Vec::new(),
            required_elements: Vec::new(),
            cta_phrases: CTA_PHRASES.iter().map(|s| s.to_string()).collect(),
            weights: CheckWeights::default(),
        }
    }
}

impl ScoringConfig {
    /// Override the word range of one content type.
    pub fn with_word_range(mut self, content_type: ContentType, min: usize, max: usize) -> Result<Self> {
        self.word_ranges
            .insert(content_type, WordRange::new(min, max)?);
        Ok(self)
    }

    pub fn with_forbidden_phrases(mut self, phrases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.forbidden_phrases = phrases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_required_elements(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_elements = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn word_range(&self, content_type: ContentType) -> WordRange {
        self.word_ranges
            .get(&content_type)
            .copied()
            .unwrap_or_else(|| content_type.default_word_range())
    }
}

/// What the evaluator looks at for one draft.
#[derive(Debug, Clone)]
pub struct ReviewInput<'a> {
    pub content: &'a GeneratedContent,
    pub content_type: ContentType,
    pub request_text: &'a str,
    pub company_name: Option<&'a str>,
    /// Overrides the configured range for this one review.
    pub word_range: Option<WordRange>,
}

/// Scores a draft. Implemented by [`Evaluator`]; tests substitute fixed
/// reviewers.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(
        &self,
        content: &GeneratedContent,
        context: &GenerationContext,
    ) -> Result<ReviewResult>;
}

struct Phrase {
    label: String,
    pattern: Regex,
}

/// Deterministic rule-based reviewer.
pub struct Evaluator {
    config: ScoringConfig,
    forbidden: Vec<Phrase>,
    required: Vec<Phrase>,
    cta: Vec<Regex>,
    quantified: Regex,
}

impl Evaluator {
    /// Compile the configured phrases and patterns.
    pub fn new(config: ScoringConfig) -> Result<Self> {
        let forbidden = config
            .forbidden_phrases
            .iter()
            .map(|p| {
                Ok(Phrase {
                    label: p.trim().to_string(),
                    pattern: forbidden_regex(p)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let required = config
            .required_elements
            .iter()
            .map(|p| {
                Ok(Phrase {
                    label: p.clone(),
                    pattern: required_regex(p)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let cta = config
            .cta_phrases
            .iter()
            .map(|p| phrase_regex(p))
            .collect::<Result<Vec<_>>>()?;

        let quantified = Regex::new(QUANTIFIED_CLAIM)
            .map_err(|e| Error::validation(format!("quantified-claim pattern: {}", e)))?;

        Ok(Self {
            config,
            forbidden,
            required,
            cta,
            quantified,
        })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Run every check and compute the weighted score.
    pub fn evaluate(&self, input: &ReviewInput<'_>) -> ReviewResult {
        let body = input.content.body.as_str();
        let mut passed = BTreeSet::new();
        let mut failed = BTreeSet::new();
        let mut issues = Vec::new();

        let range = input
            .word_range
            .unwrap_or_else(|| self.config.word_range(input.content_type));
        record(
            Check::Length,
            self.check_length(input.content.word_count, range, input.content_type),
            &mut passed,
            &mut failed,
            &mut issues,
        );
        record(
            Check::Specificity,
            self.check_specificity(body),
            &mut passed,
            &mut failed,
            &mut issues,
        );
        record(
            Check::Personalization,
            check_personalization(body, input.company_name, input.request_text),
            &mut passed,
            &mut failed,
            &mut issues,
        );
        record(
            Check::Structure,
            self.check_structure(body),
            &mut passed,
            &mut failed,
            &mut issues,
        );

        let score: f64 = passed
            .iter()
            .map(|c| self.config.weights.weight(*c) * 10.0)
            .sum();

        ReviewResult {
            score: score.clamp(0.0, 10.0),
            passed_checks: passed,
            failed_checks: failed,
            issues,
        }
    }

    fn check_length(&self, words: usize, range: WordRange, content_type: ContentType) -> Vec<Issue> {
        if range.contains(words) {
            return Vec::new();
        }
        let (verb, fix) = if words < range.min {
            ("short", format!("Expand to at least {} words with concrete outcomes.", range.min))
        } else {
            ("long", format!("Trim to at most {} words; cut generic filler first.", range.max))
        };
        vec![issue(
            Check::Length,
            format!(
                "{} is too {}: {} words, expected {}-{}.",
                content_type, verb, words, range.min, range.max
            ),
            fix,
            Severity::Medium,
        )]
    }

    fn check_specificity(&self, body: &str) -> Vec<Issue> {
        if self.quantified.is_match(body) {
            return Vec::new();
        }
        vec![issue(
            Check::Specificity,
            "No quantified outcome (percentage, dollar amount, or time saved).".to_string(),
            "Cite a concrete metric from a relevant case study, e.g. '40% faster reporting'.".to_string(),
            Severity::High,
        )]
    }

    fn check_structure(&self, body: &str) -> Vec<Issue> {
        let mut issues = Vec::new();

        if !self.cta.iter().any(|re| re.is_match(body)) {
            issues.push(issue(
                Check::Structure,
                "No clear call to action.".to_string(),
                "Close by inviting the reader to schedule a call or discuss next steps.".to_string(),
                Severity::Medium,
            ));
        }
        for phrase in &self.forbidden {
            if phrase.pattern.is_match(body) {
                issues.push(issue(
                    Check::Structure,
                    format!("Uses forbidden phrase '{}'.", phrase.label),
                    format!("Remove or rephrase '{}'.", phrase.label),
                    Severity::High,
                ));
            }
        }
        for element in &self.required {
            if !element.pattern.is_match(body) {
                issues.push(issue(
                    Check::Structure,
                    format!("Missing required element '{}'.", element.label),
                    format!("Add content matching '{}'.", element.label),
                    Severity::Medium,
                ));
            }
        }
        issues
    }
}

#[async_trait]
impl Reviewer for Evaluator {
    async fn review(
        &self,
        content: &GeneratedContent,
        context: &GenerationContext,
    ) -> Result<ReviewResult> {
        Ok(self.evaluate(&ReviewInput {
            content,
            content_type: context.content_type,
            request_text: &context.request_text,
            company_name: context.company_name.as_deref(),
            word_range: Some(context.word_range),
        }))
    }
}

fn record(
    check: Check,
    found: Vec<Issue>,
    passed: &mut BTreeSet<Check>,
    failed: &mut BTreeSet<Check>,
    issues: &mut Vec<Issue>,
) {
    if found.is_empty() {
        passed.insert(check);
    } else {
        failed.insert(check);
        issues.extend(found);
    }
}

fn issue(check: Check, description: String, suggested_fix: String, severity: Severity) -> Issue {
    Issue {
        category: check.as_str().to_string(),
        description,
        suggested_fix,
        severity,
    }
}

/// A numeral next to `%`, a currency symbol (either side), or a unit word.
const QUANTIFIED_CLAIM: &str = r"(?i)[$€£¥]\s?\d|\d(?:[\d,.]*\d)?\s?[$€£¥]|\d(?:[\d,]*\d)?(?:\.\d+)?\s*(?:%|(?:percent|x|hours?|days?|weeks?|months?|years?|minutes?|users?|customers?|clients?|records?|k|m)\b)";

fn check_personalization(body: &str, company: Option<&str>, request: &str) -> Vec<Issue> {
    match company.map(str::trim).filter(|c| !c.is_empty()) {
        Some(name) => {
            let mentions = body.to_lowercase().matches(&name.to_lowercase()).count();
            if mentions >= 2 {
                return Vec::new();
            }
            vec![issue(
                Check::Personalization,
                format!("{} is mentioned {} time(s); expected at least 2.", name, mentions),
                format!("Reference {} and its situation directly in the opening and the close.", name),
                Severity::Medium,
            )]
        }
        None => {
            let wanted: HashSet<String> = tokenize(request).into_iter().collect();
            if wanted.is_empty() || tokenize(body).iter().any(|t| wanted.contains(t)) {
                return Vec::new();
            }
            vec![issue(
                Check::Personalization,
                "Draft does not reflect the request.".to_string(),
                "Address the problem described in the request explicitly.".to_string(),
                Severity::Medium,
            )]
        }
    }
}

/// Case-insensitive substring matcher: the body must not contain the
/// phrase anywhere. A trailing `*` is accepted for prefix matching.
fn forbidden_regex(phrase: &str) -> Result<Regex> {
    let phrase = phrase.trim();
    let stem = phrase.strip_suffix('*').map(str::trim_end).unwrap_or(phrase);
    if stem.is_empty() {
        return Err(Error::validation("phrases must not be empty"));
    }
    Regex::new(&format!("(?i){}", regex::escape(stem)))
        .map_err(|e| Error::validation(format!("phrase '{}': {}", phrase, e)))
}

/// Case-insensitive, word-bounded matcher for call-to-action phrases.
/// A trailing `*` matches any word starting with the phrase.
fn phrase_regex(phrase: &str) -> Result<Regex> {
    let phrase = phrase.trim();
    let (stem, prefix) = match phrase.strip_suffix('*') {
        Some(stem) => (stem.trim_end(), true),
        None => (phrase, false),
    };
    if stem.is_empty() {
        return Err(Error::validation("phrases must not be empty"));
    }

    let mut pattern = String::from("(?i)");
    if stem.starts_with(|c: char| c.is_alphanumeric()) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(stem));
    if !prefix && stem.ends_with(|c: char| c.is_alphanumeric()) {
        pattern.push_str(r"\b");
    }
    Regex::new(&pattern).map_err(|e| Error::validation(format!("phrase '{}': {}", phrase, e)))
}

/// Required elements are regexes; an invalid one is matched literally.
fn required_regex(pattern: &str) -> Result<Regex> {
    if pattern.trim().is_empty() {
        return Err(Error::validation("required elements must not be empty"));
    }
    Regex::new(&format!("(?i){}", pattern))
        .or_else(|_| Regex::new(&format!("(?i){}", regex::escape(pattern))))
        .map_err(|e| Error::validation(format!("required element '{}': {}", pattern, e)))
}
