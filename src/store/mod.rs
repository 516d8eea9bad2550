//! Storage boundary for pipeline state.
//!
//! The orchestrator's correctness leans on two uniqueness constraints the
//! store must enforce atomically, not on in-process locks: at most one
//! non-terminal artifact per (stage, upstream) slot, and at most one
//! pending review per target. Status writes are compare-and-swap
//! transitions so a stale caller fails with a conflict instead of
//! clobbering newer state.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::{
    ArtifactId, ArtifactStatus, ArtifactToken, Project, ProjectId, ReviewId, ReviewItem,
    ReviewStatus, StageArtifact, StoryId, UserStory,
};
use crate::errors::StoreError;

/// Fields written alongside a status transition.
#[derive(Debug, Clone, Default)]
pub struct ArtifactPatch {
    /// Generated content to attach.
    pub content: Option<String>,
    /// Review reference to link.
    pub review: Option<ReviewId>,
}

impl ArtifactPatch {
    /// An empty patch.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Attaches generated content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Links a review.
    #[must_use]
    pub fn with_review(mut self, review: ReviewId) -> Self {
        self.review = Some(review);
        self
    }
}

/// Project persistence.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Inserts a project.
    async fn insert_project(&self, project: Project) -> Result<(), StoreError>;

    /// Fetches a project by id.
    async fn project(&self, id: ProjectId) -> Result<Option<Project>, StoreError>;
}

/// Artifact persistence with slot-uniqueness enforcement.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Inserts an artifact, claiming its (stage, upstream) slot.
    ///
    /// Fails with [`StoreError::SlotOccupied`] when a non-terminal artifact
    /// already holds the slot. A terminal occupant is evicted from the
    /// index and replaced.
    async fn insert_artifact(&self, artifact: StageArtifact) -> Result<(), StoreError>;

    /// Fetches an artifact by id.
    async fn artifact(&self, id: ArtifactId) -> Result<Option<StageArtifact>, StoreError>;

    /// Fetches an artifact by its client-facing token.
    async fn artifact_by_token(
        &self,
        token: &ArtifactToken,
    ) -> Result<Option<StageArtifact>, StoreError>;

    /// Compare-and-swap status transition.
    ///
    /// Moves the artifact from exactly `from` to `to`, applying the patch,
    /// and releases the slot when `to` is terminal. Fails with
    /// [`StoreError::StatusMismatch`] when the artifact is not at `from`.
    async fn transition_artifact(
        &self,
        id: ArtifactId,
        from: ArtifactStatus,
        to: ArtifactStatus,
        patch: ArtifactPatch,
    ) -> Result<StageArtifact, StoreError>;

    /// Lists artifacts sitting at `Processing` since before `cutoff`.
    async fn stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<StageArtifact>, StoreError>;
}

/// User-story persistence.
#[async_trait]
pub trait StoryStore: Send + Sync {
    /// Inserts the stories parsed from a stories artifact.
    async fn insert_stories(&self, stories: Vec<UserStory>) -> Result<(), StoreError>;

    /// Fetches a story by id.
    async fn story(&self, id: StoryId) -> Result<Option<UserStory>, StoreError>;

    /// Lists the stories belonging to an artifact.
    async fn stories_for(&self, artifact: ArtifactId) -> Result<Vec<UserStory>, StoreError>;

    /// Compare-and-swap story status transition, optionally linking a review.
    async fn transition_story(
        &self,
        id: StoryId,
        from: ArtifactStatus,
        to: ArtifactStatus,
        review: Option<ReviewId>,
    ) -> Result<UserStory, StoreError>;
}

/// Review persistence with pending-uniqueness enforcement.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Inserts a pending review, claiming the target's pending slot.
    ///
    /// Fails with [`StoreError::PendingExists`] when the target already
    /// has a pending review.
    async fn insert_review(&self, review: ReviewItem) -> Result<(), StoreError>;

    /// Fetches a review by id.
    async fn review(&self, id: ReviewId) -> Result<Option<ReviewItem>, StoreError>;

    /// Lists all pending reviews.
    async fn pending_reviews(&self) -> Result<Vec<ReviewItem>, StoreError>;

    /// Records a decision and releases the target's pending slot.
    async fn mark_decided(
        &self,
        id: ReviewId,
        status: ReviewStatus,
        feedback: Option<String>,
        decided_at: DateTime<Utc>,
    ) -> Result<ReviewItem, StoreError>;
}

/// Everything the pipeline needs from one backing store.
pub trait PipelineStore:
    ProjectStore + ArtifactStore + StoryStore + ReviewStore + std::fmt::Debug
{
}

impl<T> PipelineStore for T where
    T: ProjectStore + ArtifactStore + StoryStore + ReviewStore + std::fmt::Debug
{
}
