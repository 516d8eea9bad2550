//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::StageType;
use crate::gateway::RetryPolicy;

/// Which stages require a human review decision.
///
/// A stage with review disabled transitions Processing -> Approved
/// directly and never opens a review item. The defaults follow the
/// product's documented behavior: prompt generation bypasses review for
/// throughput, every other stage is gated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewPolicy {
    /// Requirements analysis.
    pub requirements: bool,
    /// Project planning.
    pub planning: bool,
    /// Story generation.
    pub stories: bool,
    /// Prompt generation.
    pub prompts: bool,
    /// Code generation.
    pub code: bool,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            requirements: true,
            planning: true,
            stories: true,
            prompts: false,
            code: true,
        }
    }
}

impl ReviewPolicy {
    /// Returns whether a stage requires human review.
    #[must_use]
    pub fn requires_review(&self, stage: StageType) -> bool {
        match stage {
            StageType::Requirements => self.requirements,
            StageType::Planning => self.planning,
            StageType::Stories => self.stories,
            StageType::Prompts => self.prompts,
            StageType::Code => self.code,
        }
    }

    /// Overrides one stage's flag.
    #[must_use]
    pub fn with_stage(mut self, stage: StageType, requires_review: bool) -> Self {
        match stage {
            StageType::Requirements => self.requirements = requires_review,
            StageType::Planning => self.planning = requires_review,
            StageType::Stories => self.stories = requires_review,
            StageType::Prompts => self.prompts = requires_review,
            StageType::Code => self.code = requires_review,
        }
        self
    }

    /// A policy requiring review for every stage.
    #[must_use]
    pub fn review_everything() -> Self {
        Self {
            requirements: true,
            planning: true,
            stories: true,
            prompts: true,
            code: true,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-stage review gating.
    pub review: ReviewPolicy,
    /// Gateway retry behavior.
    pub retry: RetryPolicy,
    /// Budget for a single gateway call, in milliseconds.
    pub gateway_timeout_ms: u64,
    /// Deadline for propagating a review decision to its sink, in
    /// milliseconds. Past it, `decide()` fails rather than leaving the
    /// review and artifact diverged.
    pub decide_deadline_ms: u64,
    /// Age after which a Processing artifact counts as stuck, in seconds.
    pub stale_after_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            review: ReviewPolicy::default(),
            retry: RetryPolicy::default(),
            gateway_timeout_ms: 120_000,
            decide_deadline_ms: 2_000,
            stale_after_secs: 1_800,
        }
    }
}

impl PipelineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the review policy.
    #[must_use]
    pub fn with_review(mut self, review: ReviewPolicy) -> Self {
        self.review = review;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the gateway call budget.
    #[must_use]
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the decide-propagation deadline.
    #[must_use]
    pub fn with_decide_deadline(mut self, deadline: Duration) -> Self {
        self.decide_deadline_ms = deadline.as_millis() as u64;
        self
    }

    /// Sets the Processing staleness age.
    #[must_use]
    pub fn with_stale_after(mut self, age: Duration) -> Self {
        self.stale_after_secs = age.as_secs();
        self
    }

    /// Gateway call budget as a `Duration`.
    #[must_use]
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    /// Decide-propagation deadline as a `Duration`.
    #[must_use]
    pub fn decide_deadline(&self) -> Duration {
        Duration::from_millis(self.decide_deadline_ms)
    }

    /// Processing staleness age as a `Duration`.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}
