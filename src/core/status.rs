//! Artifact and review status enums.
//!
//! Status ordinals exist for storage compactness only. Every business
//! comparison in this crate is an equality match against a named variant:
//! `Rejected` and `Failed` sit after `Approved` in the ordinal table, so a
//! range comparison would happily treat a rejected artifact as "further
//! along" than a pending one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of a stage artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// The artifact exists but generation has not been accepted yet.
    NotStarted,
    /// Generation is in flight.
    Processing,
    /// Generation succeeded and a review decision is awaited.
    PendingReview,
    /// The linked review approved the artifact.
    Approved,
    /// The linked review rejected the artifact. Terminal.
    Rejected,
    /// Generation failed unrecoverably. Terminal.
    Failed,
}

impl ArtifactStatus {
    /// Stable storage ordinal.
    #[must_use]
    pub fn ordinal(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Processing => 1,
            Self::PendingReview => 2,
            Self::Approved => 3,
            Self::Rejected => 4,
            Self::Failed => 5,
        }
    }

    /// Decodes a storage ordinal.
    #[must_use]
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Self::NotStarted),
            1 => Some(Self::Processing),
            2 => Some(Self::PendingReview),
            3 => Some(Self::Approved),
            4 => Some(Self::Rejected),
            5 => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true if the artifact will never change state again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Failed)
    }

    /// Returns true if the artifact occupies its generation slot.
    ///
    /// A non-terminal artifact blocks a second `generate()` for the same
    /// upstream reference.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::NotStarted | Self::Processing | Self::PendingReview)
    }
}

impl Default for ArtifactStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Processing => write!(f, "processing"),
            Self::PendingReview => write!(f, "pending_review"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The status of a review item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Awaiting a human decision.
    Pending,
    /// Approved.
    Approved,
    /// Rejected.
    Rejected,
}

impl ReviewStatus {
    /// Returns true once a decision has been recorded.
    #[must_use]
    pub fn is_decided(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// The outcome requested by a reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    /// Approve the target.
    Approve,
    /// Reject the target.
    Reject,
}

impl ReviewOutcome {
    /// The review status a decision with this outcome settles at.
    #[must_use]
    pub fn as_review_status(self) -> ReviewStatus {
        match self {
            Self::Approve => ReviewStatus::Approved,
            Self::Reject => ReviewStatus::Rejected,
        }
    }

    /// The artifact status this outcome propagates to the owning target.
    #[must_use]
    pub fn as_artifact_status(self) -> ArtifactStatus {
        match self {
            Self::Approve => ArtifactStatus::Approved,
            Self::Reject => ArtifactStatus::Rejected,
        }
    }
}

impl fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
        }
    }
}
