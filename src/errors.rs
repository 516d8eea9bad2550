//! Error types for the gateflow orchestrator.
//!
//! Conflicts are a distinct, explicit error kind: a duplicate in-flight
//! generation, a second pending review for the same target, or an attempt
//! to flip an already-decided review must never be folded into a generic
//! failure or silently ignored.

use thiserror::Error;

use crate::core::{
    ArtifactId, ArtifactStatus, ReviewId, ReviewStatus, ReviewTarget, StageType, StoryId,
    UpstreamRef,
};
use crate::gateway::GatewayError;

/// The main error type for orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid input, rejected before any mutation.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// An upstream dependency is not satisfied.
    #[error("{0}")]
    Dependency(#[from] DependencyError),

    /// A conflicting operation was attempted.
    #[error("{0}")]
    Conflict(#[from] ConflictError),

    /// The referenced entity does not exist.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// The generation gateway failed.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A review decision could not be propagated to its status sink.
    #[error("{0}")]
    Notify(#[from] NotifyError),
}

/// Invalid input, detected before any state is written.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// The generation input text is empty.
    #[error("generation input for stage '{stage}' is empty")]
    EmptyInput {
        /// The stage being generated.
        stage: StageType,
    },

    /// The upstream reference shape does not match the stage.
    #[error("stage '{stage}' cannot start from upstream reference '{upstream}'")]
    UpstreamShape {
        /// The stage being generated.
        stage: StageType,
        /// The offending reference.
        upstream: UpstreamRef,
    },
}

/// A conflicting operation: the state the caller assumed no longer holds.
#[derive(Debug, Clone, Error)]
pub enum ConflictError {
    /// A non-terminal artifact already exists for this upstream slot.
    #[error(
        "a generation for stage '{stage}' upstream '{upstream}' is already in flight \
         (artifact {occupant})"
    )]
    DuplicateInFlight {
        /// The stage being generated.
        stage: StageType,
        /// The contested upstream reference.
        upstream: UpstreamRef,
        /// The artifact currently occupying the slot.
        occupant: ArtifactId,
    },

    /// A pending review already exists for the target.
    #[error("a pending review ({review}) already exists for target '{target}'")]
    PendingReviewExists {
        /// The contested target.
        target: ReviewTarget,
        /// The existing pending review.
        review: ReviewId,
    },

    /// An already-decided review cannot be flipped to a different outcome.
    #[error("review {review} is already {decided}, cannot re-decide as {requested}")]
    AlreadyDecided {
        /// The review in question.
        review: ReviewId,
        /// The recorded decision.
        decided: ReviewStatus,
        /// The conflicting requested decision.
        requested: ReviewStatus,
    },

    /// A status transition found the entity in an unexpected state.
    #[error("expected status '{expected}' but found '{actual}'")]
    StatusMismatch {
        /// The status the transition required.
        expected: ArtifactStatus,
        /// The status actually found.
        actual: ArtifactStatus,
    },
}

/// The upstream dependency chain is not satisfied.
#[derive(Debug, Clone, Error)]
pub enum DependencyError {
    /// The referenced upstream entity does not exist.
    #[error("upstream '{upstream}' for stage '{stage}' does not exist")]
    UpstreamMissing {
        /// The stage being generated.
        stage: StageType,
        /// The missing reference.
        upstream: UpstreamRef,
    },

    /// The upstream artifact exists but is not approved.
    ///
    /// This is an equality check against `Approved`; rejected and failed
    /// artifacts never satisfy a downstream dependency.
    #[error("upstream artifact {artifact} has status '{status}', stage '{stage}' requires approval")]
    UpstreamNotApproved {
        /// The stage being generated.
        stage: StageType,
        /// The upstream artifact.
        artifact: ArtifactId,
        /// Its current status.
        status: ArtifactStatus,
    },

    /// The upstream artifact belongs to the wrong stage.
    #[error("stage '{stage}' requires a '{expected}' artifact upstream, found '{found}'")]
    WrongUpstreamStage {
        /// The stage being generated.
        stage: StageType,
        /// The stage the upstream must come from.
        expected: StageType,
        /// The stage the referenced artifact belongs to.
        found: StageType,
    },

    /// The referenced user story is not approved.
    #[error("story {story} has status '{status}', prompt generation requires approval")]
    StoryNotApproved {
        /// The referenced story.
        story: StoryId,
        /// Its current status.
        status: ArtifactStatus,
    },
}

/// The referenced entity does not exist.
#[derive(Debug, Clone, Error)]
pub enum NotFoundError {
    /// No artifact with the given id.
    #[error("artifact {0} not found")]
    Artifact(ArtifactId),

    /// No review with the given id.
    #[error("review {0} not found")]
    Review(ReviewId),

    /// No story with the given id.
    #[error("story {0} not found")]
    Story(StoryId),
}

/// Storage-layer failures.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The uniqueness constraint on an in-flight slot rejected an insert.
    #[error("slot for stage '{stage}' upstream '{upstream}' is held by artifact {occupant}")]
    SlotOccupied {
        /// The stage of the rejected artifact.
        stage: StageType,
        /// The contested upstream reference.
        upstream: UpstreamRef,
        /// The artifact holding the slot.
        occupant: ArtifactId,
    },

    /// The uniqueness constraint on pending reviews rejected an insert.
    #[error("target '{target}' already has pending review {review}")]
    PendingExists {
        /// The contested target.
        target: ReviewTarget,
        /// The existing pending review.
        review: ReviewId,
    },

    /// A compare-and-swap transition found a different status.
    #[error("artifact {artifact}: expected status '{expected}', found '{actual}'")]
    StatusMismatch {
        /// The artifact being transitioned.
        artifact: ArtifactId,
        /// The status the transition required.
        expected: ArtifactStatus,
        /// The status actually found.
        actual: ArtifactStatus,
    },

    /// The entity being written does not exist.
    #[error("missing row: {0}")]
    Missing(String),

    /// Backend-specific failure.
    #[error("storage backend: {0}")]
    Backend(String),
}

/// A review decision could not reach the owning status sink.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    /// No sink is registered for the target kind.
    #[error("no status sink registered for target '{target}'")]
    NoSink {
        /// The orphaned target.
        target: ReviewTarget,
    },

    /// The sink kept failing past the decide deadline.
    ///
    /// The decision is not recorded in this case; review and artifact
    /// state are never left diverged.
    #[error("status sink for '{target}' failed past the {deadline_ms}ms deadline: {reason}")]
    DeadlineExceeded {
        /// The target whose sink failed.
        target: ReviewTarget,
        /// The configured deadline.
        deadline_ms: u64,
        /// The last sink error.
        reason: String,
    },
}

impl OrchestratorError {
    /// Returns true if the error is a conflict of any kind.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Maps a store failure to its caller-facing error kind.
    ///
    /// Uniqueness-constraint rejections surface as [`ConflictError`]; the
    /// rest stay storage errors.
    #[must_use]
    pub fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::SlotOccupied {
                stage,
                upstream,
                occupant,
            } => Self::Conflict(ConflictError::DuplicateInFlight {
                stage,
                upstream,
                occupant,
            }),
            StoreError::PendingExists { target, review } => {
                Self::Conflict(ConflictError::PendingReviewExists { target, review })
            }
            StoreError::StatusMismatch {
                expected, actual, ..
            } => Self::Conflict(ConflictError::StatusMismatch { expected, actual }),
            other => Self::Store(other),
        }
    }
}
