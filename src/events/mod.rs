//! Typed pipeline events and event sinks.
//!
//! Every observable state change flows through an [`EventSink`] so hosts
//! can wire monitoring without touching the orchestration logic.

use async_trait::async_trait;
use serde::Serialize;

use crate::core::{
    ArtifactId, ArtifactStatus, ReviewId, ReviewOutcome, ReviewTarget, StageType, StoryId,
};
use crate::gateway::GatewayError;

/// An observable pipeline state change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A generate request was accepted and an artifact written at Processing.
    ArtifactCreated {
        /// The new artifact.
        artifact: ArtifactId,
        /// Its stage.
        stage: StageType,
    },
    /// An artifact moved between statuses.
    StatusChanged {
        /// The artifact.
        artifact: ArtifactId,
        /// Its stage.
        stage: StageType,
        /// Previous status.
        from: ArtifactStatus,
        /// New status.
        to: ArtifactStatus,
    },
    /// A review was opened.
    ReviewSubmitted {
        /// The review.
        review: ReviewId,
        /// What it gates.
        target: ReviewTarget,
    },
    /// A review was decided.
    ReviewDecided {
        /// The review.
        review: ReviewId,
        /// What it gates.
        target: ReviewTarget,
        /// The decision.
        outcome: ReviewOutcome,
    },
    /// Generation failed terminally for an artifact.
    GenerationFailed {
        /// The failed artifact.
        artifact: ArtifactId,
        /// Its stage.
        stage: StageType,
        /// The gateway failure.
        reason: String,
    },
    /// Stories were parsed out of a stories artifact.
    StoriesParsed {
        /// The parent artifact.
        artifact: ArtifactId,
        /// How many stories were extracted.
        count: usize,
    },
    /// A story moved between statuses.
    StoryStatusChanged {
        /// The story.
        story: StoryId,
        /// Previous status.
        from: ArtifactStatus,
        /// New status.
        to: ArtifactStatus,
    },
}

impl PipelineEvent {
    /// Short event kind, used as the log message.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ArtifactCreated { .. } => "artifact.created",
            Self::StatusChanged { .. } => "artifact.status_changed",
            Self::ReviewSubmitted { .. } => "review.submitted",
            Self::ReviewDecided { .. } => "review.decided",
            Self::GenerationFailed { .. } => "artifact.generation_failed",
            Self::StoriesParsed { .. } => "stories.parsed",
            Self::StoryStatusChanged { .. } => "story.status_changed",
        }
    }

    /// Builds a `GenerationFailed` event from a gateway error.
    #[must_use]
    pub fn generation_failed(artifact: ArtifactId, stage: StageType, err: &GatewayError) -> Self {
        Self::GenerationFailed {
            artifact,
            stage,
            reason: err.to_string(),
        }
    }
}

/// Receiver for pipeline events.
///
/// Sinks must never fail the operation that emitted the event; errors are
/// logged and suppressed inside the sink.
#[async_trait]
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Emits an event.
    async fn emit(&self, event: PipelineEvent);
}

/// Discards all events. The default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: PipelineEvent) {
        // Intentionally empty.
    }
}

/// Logs events through the tracing framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        match &event {
            PipelineEvent::GenerationFailed { .. } => {
                tracing::warn!(event = ?event, "{}", event.kind());
            }
            _ => {
                tracing::info!(event = ?event, "{}", event.kind());
            }
        }
    }
}

/// Collects events for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns collected events of the given kind.
    #[must_use]
    pub fn of_kind(&self, kind: &str) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|event| event.kind() == kind)
            .cloned()
            .collect()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }
}
