//! Stage artifacts and upstream references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ArtifactId, ArtifactToken, ProjectId, ReviewId, StoryId};
use super::stage::StageType;
use super::status::ArtifactStatus;

/// What a stage artifact was generated from.
///
/// The reference shape is stage-specific: the first stage attaches to a
/// project, prompt generation names both the stories artifact and the
/// specific story it expands, and every other stage consumes a single
/// upstream artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpstreamRef {
    /// The project a first-stage artifact attaches to.
    Project {
        /// Project identifier.
        project: ProjectId,
    },
    /// An approved upstream artifact.
    Artifact {
        /// Artifact identifier.
        artifact: ArtifactId,
    },
    /// A specific approved user story within a stories artifact.
    Story {
        /// The stories artifact the story belongs to.
        artifact: ArtifactId,
        /// The story being expanded into a prompt.
        story: StoryId,
    },
}

impl UpstreamRef {
    /// Reference to a project.
    #[must_use]
    pub fn project(project: ProjectId) -> Self {
        Self::Project { project }
    }

    /// Reference to an upstream artifact.
    #[must_use]
    pub fn artifact(artifact: ArtifactId) -> Self {
        Self::Artifact { artifact }
    }

    /// Reference to a story within a stories artifact.
    #[must_use]
    pub fn story(artifact: ArtifactId, story: StoryId) -> Self {
        Self::Story { artifact, story }
    }

    /// The upstream artifact id, when the reference carries one.
    #[must_use]
    pub fn artifact_id(&self) -> Option<ArtifactId> {
        match self {
            Self::Project { .. } => None,
            Self::Artifact { artifact } | Self::Story { artifact, .. } => Some(*artifact),
        }
    }
}

impl fmt::Display for UpstreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project { project } => write!(f, "project:{project}"),
            Self::Artifact { artifact } => write!(f, "artifact:{artifact}"),
            Self::Story { artifact, story } => write!(f, "story:{artifact}/{story}"),
        }
    }
}

/// A single stage's generated output plus its lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageArtifact {
    /// Artifact identifier.
    pub id: ArtifactId,
    /// Stable opaque token issued at creation.
    pub token: ArtifactToken,
    /// Which pipeline stage produced this artifact.
    pub stage: StageType,
    /// What the artifact was generated from.
    pub upstream: UpstreamRef,
    /// Authoritative lifecycle status.
    pub status: ArtifactStatus,
    /// Generated content, present once the gateway has returned.
    pub content: Option<String>,
    /// The review gating this artifact, once submitted.
    pub review: Option<ReviewId>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last status change instant.
    pub updated_at: DateTime<Utc>,
}

impl StageArtifact {
    /// Creates an artifact in the `Processing` state.
    ///
    /// `generate()` persists the artifact in this state before invoking the
    /// generation gateway, so a crash mid-call leaves a recoverable record.
    #[must_use]
    pub fn processing(stage: StageType, upstream: UpstreamRef) -> Self {
        let id = ArtifactId::new();
        let now = Utc::now();
        Self {
            id,
            token: ArtifactToken::issue(id, now),
            stage,
            upstream,
            status: ArtifactStatus::Processing,
            content: None,
            review: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seconds the artifact has sat in its current status.
    #[must_use]
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.updated_at).num_seconds()
    }
}
