//! Status sinks: where review decisions land on artifacts and stories.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::{
    ArtifactId, ArtifactStatus, ReviewOutcome, ReviewTarget, StageType, StoryId,
};
use crate::errors::{ConflictError, NotFoundError, OrchestratorError};
use crate::events::{EventSink, PipelineEvent};
use crate::review::{ReviewGate, StatusSink};
use crate::store::{ArtifactPatch, ArtifactStore, PipelineStore, StoryStore};

/// Applies artifact review decisions: PendingReview -> Approved/Rejected.
///
/// Replays are answered from the artifact's current status, so the
/// notifier can retry freely. Approving a stories artifact additionally
/// opens the per-story reviews; that step is retried on replay too, so a
/// partial first application converges.
#[derive(Debug)]
pub struct ArtifactSink {
    stage: StageType,
    store: Arc<dyn PipelineStore>,
    gate: Arc<ReviewGate>,
    events: Arc<dyn EventSink>,
}

impl ArtifactSink {
    /// Creates the sink for one stage's artifacts.
    #[must_use]
    pub fn new(
        stage: StageType,
        store: Arc<dyn PipelineStore>,
        gate: Arc<ReviewGate>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            stage,
            store,
            gate,
            events,
        }
    }
}

#[async_trait]
impl StatusSink for ArtifactSink {
    async fn apply_decision(
        &self,
        target_id: Uuid,
        outcome: ReviewOutcome,
        _feedback: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        let id = ArtifactId::from(target_id);
        let artifact = self
            .store
            .artifact(id)
            .await
            .map_err(OrchestratorError::from_store)?
            .ok_or(NotFoundError::Artifact(id))?;

        let desired = outcome.as_artifact_status();
        if artifact.status == desired {
            // Replay: the transition already happened.
        } else if artifact.status == ArtifactStatus::PendingReview {
            self.store
                .transition_artifact(
                    id,
                    ArtifactStatus::PendingReview,
                    desired,
                    ArtifactPatch::none(),
                )
                .await
                .map_err(OrchestratorError::from_store)?;
            self.events
                .emit(PipelineEvent::StatusChanged {
                    artifact: id,
                    stage: self.stage,
                    from: ArtifactStatus::PendingReview,
                    to: desired,
                })
                .await;
        } else {
            return Err(ConflictError::StatusMismatch {
                expected: ArtifactStatus::PendingReview,
                actual: artifact.status,
            }
            .into());
        }

        if self.stage == StageType::Stories && outcome == ReviewOutcome::Approve {
            activate_stories(&self.store, &self.gate, &self.events, id).await?;
        }
        Ok(())
    }
}

/// Applies story review decisions: PendingReview -> Approved/Rejected.
#[derive(Debug)]
pub struct StorySink {
    store: Arc<dyn PipelineStore>,
    events: Arc<dyn EventSink>,
}

impl StorySink {
    /// Creates the story sink.
    #[must_use]
    pub fn new(store: Arc<dyn PipelineStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }
}

#[async_trait]
impl StatusSink for StorySink {
    async fn apply_decision(
        &self,
        target_id: Uuid,
        outcome: ReviewOutcome,
        _feedback: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        let id = StoryId::from(target_id);
        let story = self
            .store
            .story(id)
            .await
            .map_err(OrchestratorError::from_store)?
            .ok_or(NotFoundError::Story(id))?;

        let desired = outcome.as_artifact_status();
        if story.status == desired {
            return Ok(());
        }
        if story.status != ArtifactStatus::PendingReview {
            return Err(ConflictError::StatusMismatch {
                expected: ArtifactStatus::PendingReview,
                actual: story.status,
            }
            .into());
        }

        self.store
            .transition_story(id, ArtifactStatus::PendingReview, desired, None)
            .await
            .map_err(OrchestratorError::from_store)?;
        self.events
            .emit(PipelineEvent::StoryStatusChanged {
                story: id,
                from: ArtifactStatus::PendingReview,
                to: desired,
            })
            .await;
        Ok(())
    }
}

/// Opens a review for every not-yet-activated story of an approved
/// stories artifact and moves it to PendingReview.
///
/// Idempotent: stories already past NotStarted are skipped, so both the
/// approval replay path and a retried partial activation converge.
pub(crate) async fn activate_stories(
    store: &Arc<dyn PipelineStore>,
    gate: &ReviewGate,
    events: &Arc<dyn EventSink>,
    artifact: ArtifactId,
) -> Result<(), OrchestratorError> {
    let stories = store
        .stories_for(artifact)
        .await
        .map_err(OrchestratorError::from_store)?;

    for story in stories {
        if story.status != ArtifactStatus::NotStarted {
            continue;
        }
        let review = gate
            .submit(ReviewTarget::story(story.id), story.title.clone())
            .await?;
        store
            .transition_story(
                story.id,
                ArtifactStatus::NotStarted,
                ArtifactStatus::PendingReview,
                Some(review),
            )
            .await
            .map_err(OrchestratorError::from_store)?;
        events
            .emit(PipelineEvent::StoryStatusChanged {
                story: story.id,
                from: ArtifactStatus::NotStarted,
                to: ArtifactStatus::PendingReview,
            })
            .await;
        tracing::debug!(story = %story.id, %artifact, "story review opened");
    }
    Ok(())
}
