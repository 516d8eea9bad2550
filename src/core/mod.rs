//! Core domain types: projects, artifacts, reviews, stories, statuses.

mod artifact;
mod ids;
mod project;
mod review;
mod stage;
mod status;
pub mod story;

pub use artifact::{StageArtifact, UpstreamRef};
pub use ids::{ArtifactId, ArtifactToken, ProjectId, ReviewId, StoryId};
pub use project::Project;
pub use review::{ReviewItem, ReviewTarget, ReviewTargetKind};
pub use stage::StageType;
pub use status::{ArtifactStatus, ReviewOutcome, ReviewStatus};
pub use story::{parse_stories, UserStory};
