//! In-memory pipeline store backed by concurrent hash maps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{ArtifactPatch, ArtifactStore, ProjectStore, ReviewStore, StoryStore};
use crate::core::{
    ArtifactId, ArtifactStatus, ArtifactToken, Project, ProjectId, ReviewId, ReviewItem,
    ReviewStatus, ReviewTarget, StageArtifact, StageType, StoryId, UpstreamRef, UserStory,
};
use crate::errors::StoreError;

/// A generation slot: one stage over one upstream reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    stage: StageType,
    upstream: UpstreamRef,
}

/// Concurrent in-memory store.
///
/// The slot and pending indexes are updated through `DashMap` entries, so
/// the uniqueness checks and the claims they guard are a single atomic
/// step per shard; two racing `generate()` calls cannot both claim a slot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: DashMap<ProjectId, Project>,
    artifacts: DashMap<ArtifactId, StageArtifact>,
    tokens: DashMap<ArtifactToken, ArtifactId>,
    slots: DashMap<SlotKey, ArtifactId>,
    stories: DashMap<StoryId, UserStory>,
    story_index: DashMap<ArtifactId, Vec<StoryId>>,
    reviews: DashMap<ReviewId, ReviewItem>,
    pending: DashMap<ReviewTarget, ReviewId>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of artifacts held.
    #[must_use]
    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn insert_project(&self, project: Project) -> Result<(), StoreError> {
        self.projects.insert(project.id, project);
        Ok(())
    }

    async fn project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.get(&id).map(|entry| entry.clone()))
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn insert_artifact(&self, artifact: StageArtifact) -> Result<(), StoreError> {
        let key = SlotKey {
            stage: artifact.stage,
            upstream: artifact.upstream.clone(),
        };

        match self.slots.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(artifact.id);
            }
            Entry::Occupied(mut occupied) => {
                let occupant = *occupied.get();
                let occupant_in_flight = self
                    .artifacts
                    .get(&occupant)
                    .is_some_and(|existing| existing.status.is_in_flight());
                if occupant_in_flight {
                    return Err(StoreError::SlotOccupied {
                        stage: artifact.stage,
                        upstream: artifact.upstream.clone(),
                        occupant,
                    });
                }
                occupied.insert(artifact.id);
            }
        }

        self.tokens.insert(artifact.token.clone(), artifact.id);
        self.artifacts.insert(artifact.id, artifact);
        Ok(())
    }

    async fn artifact(&self, id: ArtifactId) -> Result<Option<StageArtifact>, StoreError> {
        Ok(self.artifacts.get(&id).map(|entry| entry.clone()))
    }

    async fn artifact_by_token(
        &self,
        token: &ArtifactToken,
    ) -> Result<Option<StageArtifact>, StoreError> {
        let Some(id) = self.tokens.get(token).map(|entry| *entry) else {
            return Ok(None);
        };
        self.artifact(id).await
    }

    async fn transition_artifact(
        &self,
        id: ArtifactId,
        from: ArtifactStatus,
        to: ArtifactStatus,
        patch: ArtifactPatch,
    ) -> Result<StageArtifact, StoreError> {
        let updated = {
            let mut entry = self
                .artifacts
                .get_mut(&id)
                .ok_or_else(|| StoreError::Missing(format!("artifact {id}")))?;

            if entry.status != from {
                return Err(StoreError::StatusMismatch {
                    artifact: id,
                    expected: from,
                    actual: entry.status,
                });
            }

            entry.status = to;
            entry.updated_at = Utc::now();
            if let Some(content) = patch.content {
                entry.content = Some(content);
            }
            if let Some(review) = patch.review {
                entry.review = Some(review);
            }
            entry.clone()
        };

        if to.is_terminal() {
            let key = SlotKey {
                stage: updated.stage,
                upstream: updated.upstream.clone(),
            };
            // Release the slot only if this artifact still holds it.
            self.slots.remove_if(&key, |_, holder| *holder == id);
        }

        Ok(updated)
    }

    async fn stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<StageArtifact>, StoreError> {
        Ok(self
            .artifacts
            .iter()
            .filter(|entry| {
                entry.status == ArtifactStatus::Processing && entry.updated_at < cutoff
            })
            .map(|entry| entry.clone())
            .collect())
    }
}

#[async_trait]
impl StoryStore for MemoryStore {
    async fn insert_stories(&self, stories: Vec<UserStory>) -> Result<(), StoreError> {
        for story in stories {
            self.story_index
                .entry(story.artifact)
                .or_default()
                .push(story.id);
            self.stories.insert(story.id, story);
        }
        Ok(())
    }

    async fn story(&self, id: StoryId) -> Result<Option<UserStory>, StoreError> {
        Ok(self.stories.get(&id).map(|entry| entry.clone()))
    }

    async fn stories_for(&self, artifact: ArtifactId) -> Result<Vec<UserStory>, StoreError> {
        let Some(ids) = self.story_index.get(&artifact).map(|entry| entry.clone()) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.stories.get(id).map(|entry| entry.clone()))
            .collect())
    }

    async fn transition_story(
        &self,
        id: StoryId,
        from: ArtifactStatus,
        to: ArtifactStatus,
        review: Option<ReviewId>,
    ) -> Result<UserStory, StoreError> {
        let mut entry = self
            .stories
            .get_mut(&id)
            .ok_or_else(|| StoreError::Missing(format!("story {id}")))?;

        if entry.status != from {
            return Err(StoreError::StatusMismatch {
                artifact: ArtifactId(id.as_uuid()),
                expected: from,
                actual: entry.status,
            });
        }

        entry.status = to;
        if let Some(review) = review {
            entry.review = Some(review);
        }
        Ok(entry.clone())
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn insert_review(&self, review: ReviewItem) -> Result<(), StoreError> {
        match self.pending.entry(review.target) {
            Entry::Vacant(vacant) => {
                vacant.insert(review.id);
            }
            Entry::Occupied(mut occupied) => {
                let existing = *occupied.get();
                let still_pending = self
                    .reviews
                    .get(&existing)
                    .is_some_and(|item| item.status == ReviewStatus::Pending);
                if still_pending {
                    return Err(StoreError::PendingExists {
                        target: review.target,
                        review: existing,
                    });
                }
                occupied.insert(review.id);
            }
        }

        self.reviews.insert(review.id, review);
        Ok(())
    }

    async fn review(&self, id: ReviewId) -> Result<Option<ReviewItem>, StoreError> {
        Ok(self.reviews.get(&id).map(|entry| entry.clone()))
    }

    async fn pending_reviews(&self) -> Result<Vec<ReviewItem>, StoreError> {
        Ok(self
            .reviews
            .iter()
            .filter(|entry| entry.status == ReviewStatus::Pending)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn mark_decided(
        &self,
        id: ReviewId,
        status: ReviewStatus,
        feedback: Option<String>,
        decided_at: DateTime<Utc>,
    ) -> Result<ReviewItem, StoreError> {
        let updated = {
            let mut entry = self
                .reviews
                .get_mut(&id)
                .ok_or_else(|| StoreError::Missing(format!("review {id}")))?;
            entry.status = status;
            entry.feedback = feedback;
            entry.decided_at = Some(decided_at);
            entry.clone()
        };

        self.pending.remove_if(&updated.target, |_, holder| *holder == id);
        Ok(updated)
    }
}
