//! Quantified-outcome extraction from case-study text.
//!
//! Two kinds of claim are recognised:
//!
//! | Text | `metric_type` | `unit` |
//! |------|---------------|--------|
//! | `90% reduction` | `reduction_percent` | `percent` |
//! | `35% faster` | `faster_percent` | `percent` |
//! | `$1.2M`, `$250K`, `$40,000` | `cost_savings` | `dollars` |
//!
//! A repeated metric type keeps its last value.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{Error, Result};
use crate::models::Metric;

const PERCENT_CLAIM: &str = r"(?i)(\d+(?:\.\d+)?)%\s*(reduction|improvement|increase|faster)";
const DOLLAR_AMOUNT: &str = r"\$(\d+(?:,\d{3})*(?:\.\d+)?)\s*([MKmk]?)\b";

pub struct MetricExtractor {
    percent: Regex,
    dollars: Regex,
}

impl MetricExtractor {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::validation(format!("metric pattern: {}", e)))
        };
        Ok(Self {
            percent: compile(PERCENT_CLAIM)?,
            dollars: compile(DOLLAR_AMOUNT)?,
        })
    }

    /// Metrics found in `text`, ordered by type.
    pub fn extract(&self, text: &str) -> Vec<Metric> {
        let mut found: BTreeMap<String, Metric> = BTreeMap::new();

        for caps in self.percent.captures_iter(text) {
            let Ok(value) = caps[1].parse::<f64>() else {
                continue;
            };
            let metric_type = format!("{}_percent", caps[2].to_lowercase());
            found.insert(
                metric_type.clone(),
                Metric {
                    metric_type,
                    value,
                    unit: "percent".to_string(),
                },
            );
        }

        for caps in self.dollars.captures_iter(text) {
            let Ok(amount) = caps[1].replace(',', "").parse::<f64>() else {
                continue;
            };
            let scale = match caps.get(2).map(|m| m.as_str()) {
                Some("M") | Some("m") => 1_000_000.0,
                Some("K") | Some("k") => 1_000.0,
                _ => 1.0,
            };
            found.insert(
                "cost_savings".to_string(),
                Metric {
                    metric_type: "cost_savings".to_string(),
                    value: amount * scale,
                    unit: "dollars".to_string(),
                },
            );
        }

        found.into_values().collect()
    }
}

/// One-shot convenience over [`MetricExtractor`].
pub fn extract_metrics(text: &str) -> Result<Vec<Metric>> {
    Ok(MetricExtractor::new()?.extract(text))
}
