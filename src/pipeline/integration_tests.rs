//! Cross-component scenarios driving a fully assembled pipeline.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use crate::config::{PipelineConfig, ReviewPolicy};
use crate::core::{
    ArtifactId, ArtifactStatus, Project, ReviewOutcome, ReviewStatus, StageType, UpstreamRef,
};
use crate::events::CollectingEventSink;
use crate::gateway::GatewayError;
use crate::pipeline::Pipeline;
use crate::stage::GenerateInput;
use crate::testing::ScriptedGateway;

const STORY_CONTENT: &str = "\
## Story 1: Account registration
As a visitor, I want to register an account so that I can save my work.

Acceptance Criteria:
- Email and password are validated

## Story 2: Password reset
As a user, I want to reset my password so that I can regain access.
";

struct Fixture {
    pipeline: Pipeline,
    gateway: Arc<ScriptedGateway>,
    events: Arc<CollectingEventSink>,
}

fn fixture(config: PipelineConfig) -> Fixture {
    let gateway = Arc::new(ScriptedGateway::new());
    let events = Arc::new(CollectingEventSink::new());
    let pipeline = Pipeline::builder(Arc::clone(&gateway) as _)
        .with_config(config)
        .with_event_sink(Arc::clone(&events) as _)
        .build();
    Fixture {
        pipeline,
        gateway,
        events,
    }
}

impl Fixture {
    async fn project(&self) -> Project {
        self.pipeline
            .create_project("demo", "a demo project")
            .await
            .unwrap()
    }

    /// Approves the pending review linked to an artifact.
    async fn approve(&self, artifact: ArtifactId) {
        let review = self
            .pipeline
            .status(artifact)
            .await
            .unwrap()
            .review
            .expect("artifact has a review");
        self.pipeline
            .decide(review, ReviewOutcome::Approve, None)
            .await
            .unwrap();
    }

    /// Runs a stage to an approved artifact.
    async fn approved_stage(&self, stage: StageType, upstream: UpstreamRef) -> ArtifactId {
        let id = self
            .pipeline
            .generate(stage, upstream, GenerateInput::new("go"))
            .await
            .unwrap();
        if self.pipeline.status(id).await.unwrap().status == ArtifactStatus::PendingReview {
            self.approve(id).await;
        }
        id
    }
}

#[tokio::test]
async fn test_approval_unlocks_next_stage_immediately() {
    let fx = fixture(PipelineConfig::default());
    let project = fx.project().await;

    let requirements = fx
        .pipeline
        .generate(
            StageType::Requirements,
            UpstreamRef::project(project.id),
            GenerateInput::new("build a todo app"),
        )
        .await
        .unwrap();

    let upstream = UpstreamRef::artifact(requirements);
    assert!(!fx.pipeline.can_start(StageType::Planning, &upstream).await);

    fx.approve(requirements).await;

    // decide() returned, so the new state is already observable.
    assert_eq!(
        fx.pipeline.status(requirements).await.unwrap().status,
        ArtifactStatus::Approved
    );
    assert!(fx.pipeline.can_start(StageType::Planning, &upstream).await);

    fx.pipeline
        .generate(StageType::Planning, upstream, GenerateInput::empty())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_duplicate_generate_one_wins() {
    let fx = fixture(PipelineConfig::default());
    let project = fx.project().await;
    let upstream = UpstreamRef::project(project.id);

    let (first, second) = tokio::join!(
        fx.pipeline.generate(
            StageType::Requirements,
            upstream.clone(),
            GenerateInput::new("go"),
        ),
        fx.pipeline.generate(
            StageType::Requirements,
            upstream.clone(),
            GenerateInput::new("go"),
        ),
    );

    let winners = [&first, &second]
        .iter()
        .filter(|result| result.is_ok())
        .count();
    assert_eq!(winners, 1);
    let loser = if first.is_err() { first } else { second };
    assert!(loser.unwrap_err().is_conflict());
}

#[tokio::test]
async fn test_auto_approve_stage_never_enters_pending() {
    // Default policy: prompts bypass review.
    let fx = fixture(PipelineConfig::default());
    let project = fx.project().await;

    let requirements = fx
        .approved_stage(StageType::Requirements, UpstreamRef::project(project.id))
        .await;
    let planning = fx
        .approved_stage(StageType::Planning, UpstreamRef::artifact(requirements))
        .await;

    fx.gateway.push_ok(STORY_CONTENT);
    let stories = fx
        .approved_stage(StageType::Stories, UpstreamRef::artifact(planning))
        .await;

    let parsed = fx.pipeline.stories(stories).await.unwrap();
    assert_eq!(parsed.len(), 2);
    let story = &parsed[0];
    fx.pipeline
        .decide(story.review.unwrap(), ReviewOutcome::Approve, None)
        .await
        .unwrap();

    let before = fx.pipeline.pending_reviews().await.unwrap().len();
    let prompt = fx
        .pipeline
        .generate(
            StageType::Prompts,
            UpstreamRef::story(stories, story.id),
            GenerateInput::empty(),
        )
        .await
        .unwrap();

    let artifact = fx.pipeline.status(prompt).await.unwrap();
    assert_eq!(artifact.status, ArtifactStatus::Approved);
    assert!(artifact.review.is_none());
    assert_eq!(fx.pipeline.pending_reviews().await.unwrap().len(), before);
    assert!(fx
        .pipeline
        .approved_result(prompt)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_rejection_is_terminal_and_retry_is_a_new_artifact() {
    let fx = fixture(PipelineConfig::default());
    let project = fx.project().await;
    let upstream = UpstreamRef::project(project.id);

    let first = fx
        .pipeline
        .generate(
            StageType::Requirements,
            upstream.clone(),
            GenerateInput::new("build something"),
        )
        .await
        .unwrap();

    let review = fx.pipeline.status(first).await.unwrap().review.unwrap();
    let decided = fx
        .pipeline
        .decide(review, ReviewOutcome::Reject, Some("too vague".into()))
        .await
        .unwrap();
    assert_eq!(decided.status, ReviewStatus::Rejected);
    assert_eq!(decided.feedback.as_deref(), Some("too vague"));

    let artifact = fx.pipeline.status(first).await.unwrap();
    assert_eq!(artifact.status, ArtifactStatus::Rejected);
    assert_eq!(fx.pipeline.approved_result(first).await.unwrap(), None);
    assert!(
        !fx.pipeline
            .can_start(StageType::Planning, &UpstreamRef::artifact(first))
            .await
    );

    // The rejected artifact freed its slot; the retry is a fresh record
    // and the rejected one is untouched.
    let second = fx
        .pipeline
        .generate(
            StageType::Requirements,
            upstream,
            GenerateInput::new("build a specific thing"),
        )
        .await
        .unwrap();
    assert_ne!(second, first);
    assert_eq!(
        fx.pipeline.status(first).await.unwrap().status,
        ArtifactStatus::Rejected
    );
}

#[tokio::test]
async fn test_same_decision_twice_is_idempotent_flip_is_conflict() {
    let fx = fixture(PipelineConfig::default());
    let project = fx.project().await;

    let id = fx
        .pipeline
        .generate(
            StageType::Requirements,
            UpstreamRef::project(project.id),
            GenerateInput::new("go"),
        )
        .await
        .unwrap();
    let review = fx.pipeline.status(id).await.unwrap().review.unwrap();

    fx.pipeline
        .decide(review, ReviewOutcome::Approve, None)
        .await
        .unwrap();
    let replay = fx
        .pipeline
        .decide(review, ReviewOutcome::Approve, None)
        .await
        .unwrap();
    assert_eq!(replay.status, ReviewStatus::Approved);

    let err = fx
        .pipeline
        .decide(review, ReviewOutcome::Reject, None)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        fx.pipeline.status(id).await.unwrap().status,
        ArtifactStatus::Approved
    );
}

#[tokio::test]
async fn test_failed_generation_never_unlocks_downstream() {
    let fx = fixture(PipelineConfig::default());
    let project = fx.project().await;
    fx.gateway
        .push_err(GatewayError::InvalidResponse { reason: "garbled".into() });

    let id = fx
        .pipeline
        .generate(
            StageType::Requirements,
            UpstreamRef::project(project.id),
            GenerateInput::new("go"),
        )
        .await
        .unwrap();

    assert_eq!(
        fx.pipeline.status(id).await.unwrap().status,
        ArtifactStatus::Failed
    );
    assert!(
        !fx.pipeline
            .can_start(StageType::Planning, &UpstreamRef::artifact(id))
            .await
    );
    assert_eq!(fx.pipeline.approved_result(id).await.unwrap(), None);
}

#[tokio::test]
async fn test_story_approval_gates_prompts_per_story() {
    let fx = fixture(PipelineConfig::default());
    let project = fx.project().await;

    let requirements = fx
        .approved_stage(StageType::Requirements, UpstreamRef::project(project.id))
        .await;
    let planning = fx
        .approved_stage(StageType::Planning, UpstreamRef::artifact(requirements))
        .await;

    fx.gateway.push_ok(STORY_CONTENT);
    let stories_artifact = fx
        .pipeline
        .generate(
            StageType::Stories,
            UpstreamRef::artifact(planning),
            GenerateInput::empty(),
        )
        .await
        .unwrap();

    // Stories parsed but dormant while the parent awaits review.
    let parsed = fx.pipeline.stories(stories_artifact).await.unwrap();
    assert_eq!(parsed.len(), 2);
    assert!(parsed
        .iter()
        .all(|story| story.status == ArtifactStatus::NotStarted));

    // Approving the parent opens one review per story.
    fx.approve(stories_artifact).await;
    let activated = fx.pipeline.stories(stories_artifact).await.unwrap();
    assert!(activated
        .iter()
        .all(|story| story.status == ArtifactStatus::PendingReview && story.review.is_some()));

    let first = &activated[0];
    let second = &activated[1];

    // Parent approved but the story itself still pending: no prompts yet.
    let first_upstream = UpstreamRef::story(stories_artifact, first.id);
    assert!(!fx.pipeline.can_start(StageType::Prompts, &first_upstream).await);

    fx.pipeline
        .decide(first.review.unwrap(), ReviewOutcome::Approve, None)
        .await
        .unwrap();
    assert!(fx.pipeline.can_start(StageType::Prompts, &first_upstream).await);

    // The sibling story's gate is independent.
    let second_upstream = UpstreamRef::story(stories_artifact, second.id);
    assert!(
        !fx.pipeline
            .can_start(StageType::Prompts, &second_upstream)
            .await
    );

    fx.pipeline
        .decide(
            second.review.unwrap(),
            ReviewOutcome::Reject,
            Some("out of scope".into()),
        )
        .await
        .unwrap();
    assert_eq!(
        fx.pipeline.story(second.id).await.unwrap().status,
        ArtifactStatus::Rejected
    );
    assert!(
        !fx.pipeline
            .can_start(StageType::Prompts, &second_upstream)
            .await
    );
}

#[tokio::test]
async fn test_full_chain_to_code() {
    let fx = fixture(PipelineConfig::default());
    let project = fx.project().await;

    let requirements = fx
        .approved_stage(StageType::Requirements, UpstreamRef::project(project.id))
        .await;
    let planning = fx
        .approved_stage(StageType::Planning, UpstreamRef::artifact(requirements))
        .await;

    fx.gateway.push_ok(STORY_CONTENT);
    let stories = fx
        .approved_stage(StageType::Stories, UpstreamRef::artifact(planning))
        .await;

    let story = fx.pipeline.stories(stories).await.unwrap().remove(0);
    fx.pipeline
        .decide(story.review.unwrap(), ReviewOutcome::Approve, None)
        .await
        .unwrap();

    // Prompts auto-approve under the default policy.
    let prompt = fx
        .pipeline
        .generate(
            StageType::Prompts,
            UpstreamRef::story(stories, story.id),
            GenerateInput::empty(),
        )
        .await
        .unwrap();
    assert_eq!(
        fx.pipeline.status(prompt).await.unwrap().status,
        ArtifactStatus::Approved
    );

    fx.gateway.push_ok("fn main() {}");
    let code = fx
        .approved_stage(StageType::Code, UpstreamRef::artifact(prompt))
        .await;
    assert_eq!(
        fx.pipeline.approved_result(code).await.unwrap().as_deref(),
        Some("fn main() {}")
    );

    // Every stage that gated on review produced a decided review; none
    // remain pending except the second story's.
    let pending = fx.pipeline.pending_reviews().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        fx.events.of_kind("artifact.generation_failed").len(),
        0
    );
}

#[tokio::test]
async fn test_review_everything_policy_gates_prompts_too() {
    let config =
        PipelineConfig::default().with_review(ReviewPolicy::review_everything());
    let fx = fixture(config);
    let project = fx.project().await;

    let requirements = fx
        .approved_stage(StageType::Requirements, UpstreamRef::project(project.id))
        .await;
    let planning = fx
        .approved_stage(StageType::Planning, UpstreamRef::artifact(requirements))
        .await;

    fx.gateway.push_ok(STORY_CONTENT);
    let stories = fx
        .approved_stage(StageType::Stories, UpstreamRef::artifact(planning))
        .await;
    let story = fx.pipeline.stories(stories).await.unwrap().remove(0);
    fx.pipeline
        .decide(story.review.unwrap(), ReviewOutcome::Approve, None)
        .await
        .unwrap();

    let prompt = fx
        .pipeline
        .generate(
            StageType::Prompts,
            UpstreamRef::story(stories, story.id),
            GenerateInput::empty(),
        )
        .await
        .unwrap();
    assert_eq!(
        fx.pipeline.status(prompt).await.unwrap().status,
        ArtifactStatus::PendingReview
    );
}

#[tokio::test]
async fn test_expire_stale_is_a_noop_when_nothing_is_stuck() {
    let fx = fixture(PipelineConfig::default());
    let project = fx.project().await;
    fx.approved_stage(StageType::Requirements, UpstreamRef::project(project.id))
        .await;

    assert!(fx.pipeline.expire_stale().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_events_trace_the_lifecycle() {
    let fx = fixture(PipelineConfig::default());
    let project = fx.project().await;

    let id = fx
        .pipeline
        .generate(
            StageType::Requirements,
            UpstreamRef::project(project.id),
            GenerateInput::new("go"),
        )
        .await
        .unwrap();
    fx.approve(id).await;

    assert_eq!(fx.events.of_kind("artifact.created").len(), 1);
    assert_eq!(fx.events.of_kind("review.submitted").len(), 1);
    assert_eq!(fx.events.of_kind("review.decided").len(), 1);
    // Processing -> PendingReview -> Approved.
    assert_eq!(fx.events.of_kind("artifact.status_changed").len(), 2);
}
