//! The generic stage service: one lifecycle shared by all five stages.

use std::sync::Arc;

use chrono::Utc;

use crate::config::PipelineConfig;
use crate::core::{
    ArtifactId, ArtifactStatus, ArtifactToken, ReviewTarget, StageArtifact, StageType, UpstreamRef,
    UserStory,
};
use crate::errors::{DependencyError, NotFoundError, OrchestratorError};
use crate::events::{EventSink, PipelineEvent};
use crate::gateway::{GenerationGateway, GenerationRequest};
use crate::review::ReviewGate;
use crate::stage::behavior::{GenerateInput, StageBehavior};
use crate::stage::deps::DependencyValidator;
use crate::stage::sink::activate_stories;
use crate::store::{ArtifactPatch, ArtifactStore, PipelineStore, ProjectStore, StoryStore};

/// Drives one stage's generate-review-advance lifecycle.
///
/// `generate()` claims the upstream slot by persisting the artifact at
/// `Processing`, then calls the gateway with no lock held; the slot's
/// uniqueness constraint is what keeps a second caller out. A gateway
/// failure is not an error of `generate()` itself: the artifact lands at
/// `Failed`, the slot frees up, and the accepted id is still returned so
/// the caller can inspect the outcome.
pub struct StageService {
    behavior: Arc<dyn StageBehavior>,
    store: Arc<dyn PipelineStore>,
    gateway: Arc<dyn GenerationGateway>,
    gate: Arc<ReviewGate>,
    validator: DependencyValidator,
    events: Arc<dyn EventSink>,
    config: PipelineConfig,
}

impl std::fmt::Debug for StageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageService")
            .field("stage", &self.behavior.stage())
            .finish_non_exhaustive()
    }
}

impl StageService {
    /// Composes a service from its collaborators.
    #[must_use]
    pub fn new(
        behavior: Arc<dyn StageBehavior>,
        store: Arc<dyn PipelineStore>,
        gateway: Arc<dyn GenerationGateway>,
        gate: Arc<ReviewGate>,
        events: Arc<dyn EventSink>,
        config: PipelineConfig,
    ) -> Self {
        let validator = DependencyValidator::new(Arc::clone(&store));
        Self {
            behavior,
            store,
            gateway,
            gate,
            validator,
            events,
            config,
        }
    }

    /// The stage this service drives.
    #[must_use]
    pub fn stage(&self) -> StageType {
        self.behavior.stage()
    }

    /// Starts a generation for this stage from `upstream`.
    ///
    /// Fails before writing anything on invalid input, an unsatisfied
    /// dependency, or a slot already held by an in-flight artifact. Once
    /// the artifact is accepted the returned id is final; a gateway
    /// failure surfaces as that artifact at `Failed`, not as an `Err`.
    pub async fn generate(
        &self,
        upstream: UpstreamRef,
        input: GenerateInput,
    ) -> Result<ArtifactId, OrchestratorError> {
        let stage = self.behavior.stage();
        self.behavior.validate(&input)?;
        self.validator.check(stage, &upstream).await?;
        let upstream_text = self.upstream_text(&upstream).await?;

        let artifact = StageArtifact::processing(stage, upstream);
        let id = artifact.id;
        self.store
            .insert_artifact(artifact)
            .await
            .map_err(OrchestratorError::from_store)?;
        self.events
            .emit(PipelineEvent::ArtifactCreated { artifact: id, stage })
            .await;
        tracing::info!(artifact = %id, %stage, "generation accepted");

        let request = GenerationRequest::new(self.behavior.build_prompt(&upstream_text, &input))
            .with_context(self.behavior.system_context())
            .with_model_hints(input.model_hints)
            .with_timeout(self.config.gateway_timeout());

        match self.gateway.generate(request).await {
            Ok(output) => {
                self.complete(id, output.content).await?;
                Ok(id)
            }
            Err(err) => {
                self.store
                    .transition_artifact(
                        id,
                        ArtifactStatus::Processing,
                        ArtifactStatus::Failed,
                        ArtifactPatch::none(),
                    )
                    .await
                    .map_err(OrchestratorError::from_store)?;
                self.events
                    .emit(PipelineEvent::generation_failed(id, stage, &err))
                    .await;
                tracing::warn!(artifact = %id, %stage, error = %err, "generation failed");
                Ok(id)
            }
        }
    }

    /// Fetches an artifact's current state.
    pub async fn status(&self, id: ArtifactId) -> Result<StageArtifact, OrchestratorError> {
        self.store
            .artifact(id)
            .await
            .map_err(OrchestratorError::from_store)?
            .ok_or_else(|| NotFoundError::Artifact(id).into())
    }

    /// Fetches an artifact by its client-facing token.
    pub async fn status_by_token(
        &self,
        token: &ArtifactToken,
    ) -> Result<StageArtifact, OrchestratorError> {
        self.store
            .artifact_by_token(token)
            .await
            .map_err(OrchestratorError::from_store)?
            .ok_or_else(|| OrchestratorError::Store(crate::errors::StoreError::Missing(
                format!("artifact token {token}"),
            )))
    }

    /// Returns true when this stage may start from `upstream`.
    pub async fn can_start(&self, upstream: &UpstreamRef) -> bool {
        self.validator.can_start(self.behavior.stage(), upstream).await
    }

    /// The approved content of an artifact.
    ///
    /// Fails closed: `None` for every status except exactly `Approved`,
    /// including `Rejected` and `Failed`.
    pub async fn approved_result(
        &self,
        id: ArtifactId,
    ) -> Result<Option<String>, OrchestratorError> {
        let artifact = self.status(id).await?;
        if artifact.status == ArtifactStatus::Approved {
            Ok(artifact.content)
        } else {
            Ok(None)
        }
    }

    /// Expires artifacts stuck at `Processing` beyond the staleness age.
    ///
    /// Each expired artifact moves to `Failed`, freeing its slot for a
    /// fresh `generate()`. Returns the expired ids.
    pub async fn expire_stale(&self) -> Result<Vec<ArtifactId>, OrchestratorError> {
        let cutoff = Utc::now()
            - chrono::Duration::seconds(i64::try_from(self.config.stale_after_secs).unwrap_or(i64::MAX));
        let stale = self
            .store
            .stale_processing(cutoff)
            .await
            .map_err(OrchestratorError::from_store)?;

        let mut expired = Vec::new();
        for artifact in stale {
            if artifact.stage != self.behavior.stage() {
                continue;
            }
            // A racing completion wins; skip the artifact in that case.
            match self
                .store
                .transition_artifact(
                    artifact.id,
                    ArtifactStatus::Processing,
                    ArtifactStatus::Failed,
                    ArtifactPatch::none(),
                )
                .await
            {
                Ok(_) => {
                    self.events
                        .emit(PipelineEvent::StatusChanged {
                            artifact: artifact.id,
                            stage: artifact.stage,
                            from: ArtifactStatus::Processing,
                            to: ArtifactStatus::Failed,
                        })
                        .await;
                    tracing::warn!(artifact = %artifact.id, "stale processing artifact expired");
                    expired.push(artifact.id);
                }
                Err(crate::errors::StoreError::StatusMismatch { .. }) => {}
                Err(err) => return Err(OrchestratorError::from_store(err)),
            }
        }
        Ok(expired)
    }

    /// Finishes a successful generation: attach content, then either open
    /// a review or auto-approve per the stage's review flag.
    async fn complete(&self, id: ArtifactId, content: String) -> Result<(), OrchestratorError> {
        let stage = self.behavior.stage();
        let stories = self.behavior.extract_stories(id, &content);
        if !stories.is_empty() {
            let count = stories.len();
            self.store
                .insert_stories(stories)
                .await
                .map_err(OrchestratorError::from_store)?;
            self.events
                .emit(PipelineEvent::StoriesParsed {
                    artifact: id,
                    count,
                })
                .await;
        }

        if self.config.review.requires_review(stage) {
            let review = self
                .gate
                .submit(ReviewTarget::artifact(stage, id), review_summary(stage, &content))
                .await?;
            self.store
                .transition_artifact(
                    id,
                    ArtifactStatus::Processing,
                    ArtifactStatus::PendingReview,
                    ArtifactPatch::none().with_content(content).with_review(review),
                )
                .await
                .map_err(OrchestratorError::from_store)?;
            self.events
                .emit(PipelineEvent::StatusChanged {
                    artifact: id,
                    stage,
                    from: ArtifactStatus::Processing,
                    to: ArtifactStatus::PendingReview,
                })
                .await;
        } else {
            self.store
                .transition_artifact(
                    id,
                    ArtifactStatus::Processing,
                    ArtifactStatus::Approved,
                    ArtifactPatch::none().with_content(content),
                )
                .await
                .map_err(OrchestratorError::from_store)?;
            self.events
                .emit(PipelineEvent::StatusChanged {
                    artifact: id,
                    stage,
                    from: ArtifactStatus::Processing,
                    to: ArtifactStatus::Approved,
                })
                .await;
            if stage == StageType::Stories {
                activate_stories(&self.store, &self.gate, &self.events, id).await?;
            }
        }
        Ok(())
    }

    /// Resolves the text a prompt is built from.
    ///
    /// The validator has already run, so the lookups here only fail on a
    /// race with a concurrent mutation.
    async fn upstream_text(&self, upstream: &UpstreamRef) -> Result<String, OrchestratorError> {
        match upstream {
            UpstreamRef::Project { project } => {
                let project = self
                    .store
                    .project(*project)
                    .await
                    .map_err(OrchestratorError::from_store)?
                    .ok_or_else(|| DependencyError::UpstreamMissing {
                        stage: self.behavior.stage(),
                        upstream: upstream.clone(),
                    })?;
                Ok(project.description)
            }
            UpstreamRef::Artifact { artifact } => {
                let artifact = self
                    .store
                    .artifact(*artifact)
                    .await
                    .map_err(OrchestratorError::from_store)?
                    .ok_or_else(|| DependencyError::UpstreamMissing {
                        stage: self.behavior.stage(),
                        upstream: upstream.clone(),
                    })?;
                Ok(artifact.content.unwrap_or_default())
            }
            UpstreamRef::Story { story, .. } => {
                let story = self
                    .store
                    .story(*story)
                    .await
                    .map_err(OrchestratorError::from_store)?
                    .ok_or_else(|| DependencyError::UpstreamMissing {
                        stage: self.behavior.stage(),
                        upstream: upstream.clone(),
                    })?;
                Ok(story_text(&story))
            }
        }
    }
}

fn story_text(story: &UserStory) -> String {
    let mut text = format!("User story: {}\n{}", story.title, story.narrative);
    if !story.acceptance_criteria.is_empty() {
        text.push_str("\n\nAcceptance Criteria:");
        for criterion in &story.acceptance_criteria {
            text.push_str("\n- ");
            text.push_str(criterion);
        }
    }
    text
}

/// Short reviewer-facing summary: the stage plus the content's first line.
fn review_summary(stage: StageType, content: &str) -> String {
    const MAX: usize = 96;
    let first_line = content.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    let mut line = first_line.trim().to_string();
    if line.len() > MAX {
        let mut cut = MAX;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
    }
    format!("{stage}: {line}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReviewPolicy;
    use crate::core::{Project, ReviewStatus};
    use crate::events::CollectingEventSink;
    use crate::gateway::GatewayError;
    use crate::review::ApprovalNotifier;
    use crate::stage::behavior::behavior_for;
    use crate::store::{ArtifactStore, MemoryStore, ProjectStore};
    use crate::testing::ScriptedGateway;
    use std::time::Duration;

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<ScriptedGateway>,
        gate: Arc<ReviewGate>,
        events: Arc<CollectingEventSink>,
        config: PipelineConfig,
    }

    impl Harness {
        fn new(config: PipelineConfig) -> Self {
            let store = Arc::new(MemoryStore::new());
            let gateway = Arc::new(ScriptedGateway::new());
            let events = Arc::new(CollectingEventSink::new());
            let gate = Arc::new(ReviewGate::new(
                Arc::clone(&store) as _,
                ApprovalNotifier::new(Duration::from_millis(500)),
                Arc::clone(&events) as _,
            ));
            Self {
                store,
                gateway,
                gate,
                events,
                config,
            }
        }

        fn service(&self, stage: StageType) -> StageService {
            StageService::new(
                behavior_for(stage),
                Arc::clone(&self.store) as _,
                Arc::clone(&self.gateway) as _,
                Arc::clone(&self.gate),
                Arc::clone(&self.events) as _,
                self.config.clone(),
            )
        }

        async fn project(&self) -> crate::core::ProjectId {
            let project = Project::new("demo", "a demo project for tests");
            let id = project.id;
            self.store.insert_project(project).await.unwrap();
            id
        }
    }

    #[tokio::test]
    async fn test_generate_lands_at_pending_review() {
        let harness = Harness::new(PipelineConfig::default());
        let service = harness.service(StageType::Requirements);
        let project = harness.project().await;
        harness.gateway.push_ok("## Requirements\n- must do things");

        let id = service
            .generate(UpstreamRef::project(project), GenerateInput::new("build it"))
            .await
            .unwrap();

        let artifact = service.status(id).await.unwrap();
        assert_eq!(artifact.status, ArtifactStatus::PendingReview);
        assert_eq!(artifact.content.as_deref(), Some("## Requirements\n- must do things"));
        let review = harness
            .gate
            .get(artifact.review.unwrap())
            .await
            .unwrap();
        assert_eq!(review.status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn test_auto_approve_stage_skips_review() {
        let config = PipelineConfig::default()
            .with_review(ReviewPolicy::default().with_stage(StageType::Requirements, false));
        let harness = Harness::new(config);
        let service = harness.service(StageType::Requirements);
        let project = harness.project().await;

        let id = service
            .generate(UpstreamRef::project(project), GenerateInput::new("build it"))
            .await
            .unwrap();

        let artifact = service.status(id).await.unwrap();
        assert_eq!(artifact.status, ArtifactStatus::Approved);
        assert!(artifact.review.is_none());
        assert!(harness.gate.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failure_yields_failed_artifact_not_err() {
        let harness = Harness::new(PipelineConfig::default());
        let service = harness.service(StageType::Requirements);
        let project = harness.project().await;
        harness.gateway.push_err(GatewayError::Timeout { elapsed_ms: 9_000 });

        let id = service
            .generate(UpstreamRef::project(project), GenerateInput::new("build it"))
            .await
            .unwrap();

        let artifact = service.status(id).await.unwrap();
        assert_eq!(artifact.status, ArtifactStatus::Failed);
        assert_eq!(harness.events.of_kind("artifact.generation_failed").len(), 1);

        // The terminal failure freed the slot; a retry is a new artifact.
        let retry = service
            .generate(UpstreamRef::project(project), GenerateInput::new("build it"))
            .await
            .unwrap();
        assert_ne!(retry, id);
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_conflicts() {
        let harness = Harness::new(PipelineConfig::default());
        let service = harness.service(StageType::Requirements);
        let project = harness.project().await;

        service
            .generate(UpstreamRef::project(project), GenerateInput::new("build it"))
            .await
            .unwrap();

        // First artifact sits at PendingReview, holding the slot.
        let err = service
            .generate(UpstreamRef::project(project), GenerateInput::new("again"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_empty_input_rejected_before_any_write() {
        let harness = Harness::new(PipelineConfig::default());
        let service = harness.service(StageType::Requirements);
        let project = harness.project().await;

        let err = service
            .generate(UpstreamRef::project(project), GenerateInput::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert_eq!(harness.gateway.calls(), 0);
        assert!(harness.events.is_empty());
    }

    #[tokio::test]
    async fn test_dependency_not_met_rejected() {
        let harness = Harness::new(PipelineConfig::default());
        let service = harness.service(StageType::Planning);

        let err = service
            .generate(
                UpstreamRef::artifact(ArtifactId::new()),
                GenerateInput::empty(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Dependency(_)));
        assert_eq!(harness.gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_approved_result_fails_closed() {
        let harness = Harness::new(PipelineConfig::default());
        let service = harness.service(StageType::Requirements);
        let project = harness.project().await;

        let id = service
            .generate(UpstreamRef::project(project), GenerateInput::new("build it"))
            .await
            .unwrap();

        // PendingReview is not Approved.
        assert_eq!(service.approved_result(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stories_generation_parses_and_auto_activation() {
        // Stories auto-approve: stories go straight to PendingReview with
        // their own reviews.
        let config = PipelineConfig::default()
            .with_review(ReviewPolicy::default().with_stage(StageType::Stories, false));
        let harness = Harness::new(config);
        let service = harness.service(StageType::Stories);

        // Seed an approved planning artifact as upstream.
        let plan = StageArtifact::processing(
            StageType::Planning,
            UpstreamRef::artifact(ArtifactId::new()),
        );
        let plan_id = plan.id;
        harness.store.insert_artifact(plan).await.unwrap();
        harness
            .store
            .transition_artifact(
                plan_id,
                ArtifactStatus::Processing,
                ArtifactStatus::Approved,
                ArtifactPatch::none().with_content("the plan"),
            )
            .await
            .unwrap();

        harness.gateway.push_ok(
            "## Story 1: Login\nAs a user, I want to log in.\n\n\
             ## Story 2: Logout\nAs a user, I want to log out.\n",
        );
        let id = service
            .generate(UpstreamRef::artifact(plan_id), GenerateInput::empty())
            .await
            .unwrap();

        assert_eq!(harness.events.of_kind("stories.parsed").len(), 1);
        use crate::store::StoryStore;
        let stories = harness.store.stories_for(id).await.unwrap();
        assert_eq!(stories.len(), 2);
        assert!(stories
            .iter()
            .all(|story| story.status == ArtifactStatus::PendingReview && story.review.is_some()));
        // One pending review per story.
        assert_eq!(harness.gate.pending().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_status_by_token() {
        let harness = Harness::new(PipelineConfig::default());
        let service = harness.service(StageType::Requirements);
        let project = harness.project().await;

        let id = service
            .generate(UpstreamRef::project(project), GenerateInput::new("build it"))
            .await
            .unwrap();
        let token = service.status(id).await.unwrap().token;
        assert_eq!(service.status_by_token(&token).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn test_expire_stale_frees_slot() {
        let config = PipelineConfig::default().with_stale_after(Duration::from_secs(0));
        let harness = Harness::new(config);
        let service = harness.service(StageType::Requirements);
        let project = harness.project().await;

        // Insert a Processing artifact directly, as if the process died
        // mid-call.
        let stuck = StageArtifact::processing(
            StageType::Requirements,
            UpstreamRef::project(project),
        );
        let stuck_id = stuck.id;
        harness.store.insert_artifact(stuck).await.unwrap();

        // Slot is held.
        assert!(service
            .generate(UpstreamRef::project(project), GenerateInput::new("go"))
            .await
            .unwrap_err()
            .is_conflict());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let expired = service.expire_stale().await.unwrap();
        assert_eq!(expired, vec![stuck_id]);
        assert_eq!(
            service.status(stuck_id).await.unwrap().status,
            ArtifactStatus::Failed
        );

        // Freed slot accepts a fresh generation.
        service
            .generate(UpstreamRef::project(project), GenerateInput::new("go"))
            .await
            .unwrap();
    }

    #[test]
    fn test_review_summary_truncates() {
        let summary = review_summary(StageType::Planning, &"x".repeat(200));
        assert!(summary.starts_with("planning: "));
        assert!(summary.len() <= "planning: ".len() + 96);
    }
}
