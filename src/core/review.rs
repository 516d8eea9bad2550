//! Review items: the human decision records gating advancement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::ids::{ArtifactId, ReviewId, StoryId};
use super::stage::StageType;
use super::status::ReviewStatus;

/// The kind of entity a review gates.
///
/// Artifact reviews carry their stage type so the review gate's sink
/// fan-out is statically known at composition time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewTargetKind {
    /// A stage artifact of the given stage.
    Artifact {
        /// The owning stage.
        stage: StageType,
    },
    /// A user story within a stories artifact.
    Story,
}

/// A reference to the entity a review decision applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewTarget {
    /// The target kind.
    pub kind: ReviewTargetKind,
    /// The target's identifier.
    pub id: Uuid,
}

impl ReviewTarget {
    /// Targets a stage artifact.
    #[must_use]
    pub fn artifact(stage: StageType, id: ArtifactId) -> Self {
        Self {
            kind: ReviewTargetKind::Artifact { stage },
            id: id.as_uuid(),
        }
    }

    /// Targets a user story.
    #[must_use]
    pub fn story(id: StoryId) -> Self {
        Self {
            kind: ReviewTargetKind::Story,
            id: id.as_uuid(),
        }
    }
}

impl fmt::Display for ReviewTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ReviewTargetKind::Artifact { stage } => write!(f, "{stage}:{}", self.id),
            ReviewTargetKind::Story => write!(f, "story:{}", self.id),
        }
    }
}

/// A single review decision record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    /// Review identifier.
    pub id: ReviewId,
    /// What the review gates.
    pub target: ReviewTarget,
    /// Current decision status.
    pub status: ReviewStatus,
    /// Short human-readable summary shown to reviewers.
    pub summary: String,
    /// Reviewer feedback, populated on rejection.
    pub feedback: Option<String>,
    /// When the review was opened.
    pub submitted_at: DateTime<Utc>,
    /// When the decision was recorded.
    pub decided_at: Option<DateTime<Utc>>,
}

impl ReviewItem {
    /// Opens a new pending review for a target.
    #[must_use]
    pub fn pending(target: ReviewTarget, summary: impl Into<String>) -> Self {
        Self {
            id: ReviewId::new(),
            target,
            status: ReviewStatus::Pending,
            summary: summary.into(),
            feedback: None,
            submitted_at: Utc::now(),
            decided_at: None,
        }
    }
}
