//! Bounded generate → review → regenerate loop.
//!
//! ```text
//! Generating → Reviewing ─┬─ score ≥ threshold ──────────────────────→ Accepted
//!                         └─ below ─→ Revising → Reviewing ─┬─ pass ─→ Accepted
//!                                                           └─ fail ─→ ReturnedWithIssues
//! ```
//!
//! There is never a third generation. When the revision also falls short
//! the better of the two attempts is handed back (the revision wins ties)
//! together with its issues; that is a normal outcome, not an error.
//!
//! An optional deadline bounds the whole run. If it passes before the
//! first attempt has been generated and reviewed the run fails with
//! [`Error::DeadlineExceeded`]; if it passes during the revision the first
//! attempt is returned.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{GeneratedContent, ReviewResult};
use crate::review::Reviewer;
use crate::services::{GenerationContext, Generator};

/// Default acceptance score.
pub const DEFAULT_THRESHOLD: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Generating,
    Reviewing,
    Revising,
    Accepted,
    ReturnedWithIssues,
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Accepted,
    ReturnedWithIssues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub status: Outcome,
    /// The accepted draft, or the best-scoring one.
    pub content: GeneratedContent,
    /// Review of `content`.
    pub review: ReviewResult,
    /// Generator calls made (1 or 2).
    pub attempts: usize,
    /// Every state visited, in order, ending in the terminal state.
    pub states: Vec<LoopState>,
}

struct Attempt {
    content: GeneratedContent,
    review: ReviewResult,
}

/// Drives one generation request through at most two attempts.
pub struct ReviewLoop<G: ?Sized, R: ?Sized> {
    generator: Arc<G>,
    reviewer: Arc<R>,
    threshold: f64,
}

impl<G, R> ReviewLoop<G, R>
where
    G: Generator + ?Sized,
    R: Reviewer + ?Sized,
{
    pub fn new(generator: Arc<G>, reviewer: Arc<R>) -> Self {
        Self {
            generator,
            reviewer,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Run the loop for `context`, optionally bounded by `deadline`.
    pub async fn run(
        &self,
        context: GenerationContext,
        deadline: Option<Instant>,
    ) -> Result<LoopOutcome> {
        let mut states = vec![LoopState::Generating];

        let first = within(deadline, self.attempt(&context, &mut states)).await;
        let first = match first {
            Some(result) => result?,
            None => {
                warn!(content_type = %context.content_type, "deadline passed before first draft was reviewed");
                return Err(Error::DeadlineExceeded);
            }
        };
        debug!(score = first.review.score, threshold = self.threshold, "first draft reviewed");

        if first.review.score >= self.threshold {
            info!(score = first.review.score, attempts = 1, "draft accepted");
            return Ok(finish(Outcome::Accepted, first, 1, states));
        }

        states.push(LoopState::Revising);
        if deadline.map_or(false, |at| Instant::now() >= at) {
            warn!("deadline passed before revision; returning first draft");
            return Ok(finish(Outcome::ReturnedWithIssues, first, 1, states));
        }

        let mut revised = context;
        revised.feedback.extend(first.review.issues.iter().cloned());

        let second = within(deadline, self.attempt(&revised, &mut states)).await;
        let second = match second {
            Some(result) => result?,
            None => {
                warn!("deadline passed during revision; returning first draft");
                return Ok(finish(Outcome::ReturnedWithIssues, first, 2, states));
            }
        };

        if second.review.score >= self.threshold {
            info!(score = second.review.score, attempts = 2, "revision accepted");
            return Ok(finish(Outcome::Accepted, second, 2, states));
        }

        let best = if second.review.score >= first.review.score {
            second
        } else {
            first
        };
        warn!(
            score = best.review.score,
            issues = best.review.issues.len(),
            "returning draft with unresolved issues"
        );
        Ok(finish(Outcome::ReturnedWithIssues, best, 2, states))
    }

    /// Generate once and review the draft.
    async fn attempt(
        &self,
        context: &GenerationContext,
        states: &mut Vec<LoopState>,
    ) -> Result<Attempt> {
        let content = self
            .generator
            .generate(context)
            .await
            .map_err(|e| match e {
                Error::GenerationUnavailable(_) => e,
                other => Error::GenerationUnavailable(other.to_string()),
            })?;
        states.push(LoopState::Reviewing);
        let review = self.reviewer.review(&content, context).await?;
        Ok(Attempt { content, review })
    }
}

fn finish(status: Outcome, attempt: Attempt, attempts: usize, mut states: Vec<LoopState>) -> LoopOutcome {
    states.push(match status {
        Outcome::Accepted => LoopState::Accepted,
        Outcome::ReturnedWithIssues => LoopState::ReturnedWithIssues,
    });
    LoopOutcome {
        status,
        content: attempt.content,
        review: attempt.review,
        attempts,
        states,
    }
}

/// `None` when `deadline` passes first.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}
