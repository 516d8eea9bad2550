//! Pipeline composition: wires the store, gateway decorators, review
//! gate, status sinks, and the five stage services into one facade.

#[cfg(test)]
mod integration_tests;

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::core::{
    ArtifactId, ArtifactStatus, ArtifactToken, Project, ProjectId, ReviewId, ReviewItem,
    ReviewOutcome, ReviewTargetKind, StageArtifact, StageType, StoryId, UpstreamRef, UserStory,
};
use crate::errors::{NotFoundError, OrchestratorError};
use crate::events::{EventSink, NoOpEventSink};
use crate::gateway::{BreakerConfig, CircuitBreaker, GenerationGateway, RetryingGateway};
use crate::review::{ApprovalNotifier, ReviewGate, StatusSink};
use crate::stage::{behavior_for, ArtifactSink, GenerateInput, StageService, StorySink};
use crate::store::{
    ArtifactStore, MemoryStore, PipelineStore, ProjectStore, ReviewStore, StoryStore,
};

/// Builder assembling a [`Pipeline`].
///
/// Only the gateway is mandatory; the store defaults to an in-memory
/// backend and events default to a no-op sink. The gateway is always
/// wrapped in the retry decorator driven by the configured policy, and
/// optionally in a circuit breaker beneath it.
pub struct PipelineBuilder {
    gateway: Arc<dyn GenerationGateway>,
    store: Option<Arc<dyn PipelineStore>>,
    events: Option<Arc<dyn EventSink>>,
    config: PipelineConfig,
    breaker: Option<BreakerConfig>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    fn new(gateway: Arc<dyn GenerationGateway>) -> Self {
        Self {
            gateway,
            store: None,
            events: None,
            config: PipelineConfig::default(),
            breaker: None,
        }
    }

    /// Uses a specific backing store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn PipelineStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses a specific configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Emits pipeline events into the given sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Puts a circuit breaker between the retry decorator and the
    /// provider.
    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Assembles the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn PipelineStore>);
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(NoOpEventSink) as Arc<dyn EventSink>);

        let mut gateway = self.gateway;
        if let Some(breaker) = self.breaker {
            gateway = Arc::new(CircuitBreaker::new(gateway, breaker));
        }
        let gateway: Arc<dyn GenerationGateway> =
            Arc::new(RetryingGateway::new(gateway, self.config.retry.clone()));

        let notifier = ApprovalNotifier::new(self.config.decide_deadline());
        let gate = Arc::new(ReviewGate::new(
            Arc::clone(&store) as Arc<dyn ReviewStore>,
            notifier,
            Arc::clone(&events),
        ));

        // The gate holds sinks weakly; the pipeline owns them.
        let mut sinks: Vec<Arc<dyn StatusSink>> = Vec::new();
        for stage in StageType::ORDER {
            let sink: Arc<dyn StatusSink> = Arc::new(ArtifactSink::new(
                stage,
                Arc::clone(&store),
                Arc::clone(&gate),
                Arc::clone(&events),
            ));
            gate.register_sink(ReviewTargetKind::Artifact { stage }, &sink);
            sinks.push(sink);
        }
        let story_sink: Arc<dyn StatusSink> =
            Arc::new(StorySink::new(Arc::clone(&store), Arc::clone(&events)));
        gate.register_sink(ReviewTargetKind::Story, &story_sink);
        sinks.push(story_sink);

        let service = |stage: StageType| {
            StageService::new(
                behavior_for(stage),
                Arc::clone(&store),
                Arc::clone(&gateway),
                Arc::clone(&gate),
                Arc::clone(&events),
                self.config.clone(),
            )
        };

        Pipeline {
            requirements: service(StageType::Requirements),
            planning: service(StageType::Planning),
            stories: service(StageType::Stories),
            prompts: service(StageType::Prompts),
            code: service(StageType::Code),
            store,
            gate,
            _sinks: sinks,
        }
    }
}

/// The assembled five-stage pipeline.
pub struct Pipeline {
    store: Arc<dyn PipelineStore>,
    gate: Arc<ReviewGate>,
    requirements: StageService,
    planning: StageService,
    stories: StageService,
    prompts: StageService,
    code: StageService,
    _sinks: Vec<Arc<dyn StatusSink>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Starts building a pipeline over the given gateway.
    #[must_use]
    pub fn builder(gateway: Arc<dyn GenerationGateway>) -> PipelineBuilder {
        PipelineBuilder::new(gateway)
    }

    /// The service driving one stage.
    #[must_use]
    pub fn service(&self, stage: StageType) -> &StageService {
        match stage {
            StageType::Requirements => &self.requirements,
            StageType::Planning => &self.planning,
            StageType::Stories => &self.stories,
            StageType::Prompts => &self.prompts,
            StageType::Code => &self.code,
        }
    }

    /// Creates a project, the root for a requirements generation.
    pub async fn create_project(
        &self,
        name: impl Into<String> + Send,
        description: impl Into<String> + Send,
    ) -> Result<Project, OrchestratorError> {
        let project = Project::new(name, description);
        self.store
            .insert_project(project.clone())
            .await
            .map_err(OrchestratorError::from_store)?;
        Ok(project)
    }

    /// Fetches a project.
    pub async fn project(&self, id: ProjectId) -> Result<Option<Project>, OrchestratorError> {
        self.store
            .project(id)
            .await
            .map_err(OrchestratorError::from_store)
    }

    /// Starts a generation for a stage.
    pub async fn generate(
        &self,
        stage: StageType,
        upstream: UpstreamRef,
        input: GenerateInput,
    ) -> Result<ArtifactId, OrchestratorError> {
        self.service(stage).generate(upstream, input).await
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
    ) -> Result<Option<StageArtifact>, OrchestratorError> {
        self.store
            .artifact_by_token(token)
            .await
            .map_err(OrchestratorError::from_store)
    }

    /// Returns true when a stage may start from `upstream`.
    pub async fn can_start(&self, stage: StageType, upstream: &UpstreamRef) -> bool {
        self.service(stage).can_start(upstream).await
    }

    /// The approved content of an artifact; `None` unless its status is
    /// exactly `Approved`.
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

    /// Records a review decision and propagates it before returning.
    pub async fn decide(
        &self,
        review: ReviewId,
        outcome: ReviewOutcome,
        feedback: Option<String>,
    ) -> Result<ReviewItem, OrchestratorError> {
        self.gate.decide(review, outcome, feedback).await
    }

    /// Lists all open reviews.
    pub async fn pending_reviews(&self) -> Result<Vec<ReviewItem>, OrchestratorError> {
        self.gate.pending().await
    }

    /// Fetches one review.
    pub async fn review(&self, id: ReviewId) -> Result<ReviewItem, OrchestratorError> {
        self.gate.get(id).await
    }

    /// Lists the stories parsed from a stories artifact.
    pub async fn stories(&self, artifact: ArtifactId) -> Result<Vec<UserStory>, OrchestratorError> {
        self.store
            .stories_for(artifact)
            .await
            .map_err(OrchestratorError::from_store)
    }

    /// Fetches one story.
    pub async fn story(&self, id: StoryId) -> Result<UserStory, OrchestratorError> {
        self.store
            .story(id)
            .await
            .map_err(OrchestratorError::from_store)?
            .ok_or_else(|| NotFoundError::Story(id).into())
    }

    /// Expires stuck `Processing` artifacts across every stage, freeing
    /// their slots. Returns all expired ids.
    pub async fn expire_stale(&self) -> Result<Vec<ArtifactId>, OrchestratorError> {
        let sweeps = StageType::ORDER
            .iter()
            .map(|stage| self.service(*stage).expire_stale());
        let mut expired = Vec::new();
        for result in futures::future::join_all(sweeps).await {
            expired.extend(result?);
        }
        Ok(expired)
    }
}
