//! Conjunctive attribute filter applied before ranking.
//!
//! A chunk passes when every supplied clause holds; absent clauses match
//! everything. There is no OR across clause types. String comparisons are
//! case-insensitive.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Chunk, DocumentAttributes, ProjectType};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeFilter {
    /// Document industry must equal this value.
    pub industry: Option<String>,
    /// Document project type must equal this value.
    pub project_type: Option<ProjectType>,
    /// Document tech stack must contain every listed technology.
    pub technologies: Option<Vec<String>>,
    /// Chunk section must equal this value.
    pub section: Option<String>,
}

impl AttributeFilter {
    /// A filter with no clauses.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.industry.is_none()
            && self.project_type.is_none()
            && self.technologies.is_none()
            && self.section.is_none()
    }

    /// Reject empty-string clause values.
    pub fn validate(&self) -> Result<()> {
        if let Some(industry) = &self.industry {
            if industry.trim().is_empty() {
                return Err(Error::validation("industry filter must not be empty"));
            }
        }
        if let Some(techs) = &self.technologies {
            if techs.iter().any(|t| t.trim().is_empty()) {
                return Err(Error::validation("technology filter entries must not be empty"));
            }
        }
        if let Some(section) = &self.section {
            if section.trim().is_empty() {
                return Err(Error::validation("section filter must not be empty"));
            }
        }
        Ok(())
    }

    /// Document-level clauses: industry, project type, technologies.
    pub fn matches_document(&self, attrs: &DocumentAttributes) -> bool {
        if let Some(industry) = &self.industry {
            if !eq_ci(&attrs.industry, industry) {
                return false;
            }
        }
        if let Some(pt) = self.project_type {
            if attrs.project_type != pt {
                return false;
            }
        }
        if let Some(techs) = &self.technologies {
            let has_all = techs
                .iter()
                .all(|wanted| attrs.tech_stack.iter().any(|have| eq_ci(have, wanted)));
            if !has_all {
                return false;
            }
        }
        true
    }

    /// Chunk-level clause: section.
    pub fn matches_chunk(&self, chunk: &Chunk) -> bool {
        match &self.section {
            None => true,
            Some(wanted) => chunk
                .section
                .as_deref()
                .map(|s| eq_ci(s, wanted))
                .unwrap_or(false),
        }
    }

    pub fn matches(&self, attrs: &DocumentAttributes, chunk: &Chunk) -> bool {
        self.matches_document(attrs) && self.matches_chunk(chunk)
    }
}

fn eq_ci(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}
