//! Stage services: the generic lifecycle plus the five stage behaviors.

mod behavior;
mod deps;
mod service;
mod sink;

pub use behavior::{
    behavior_for, CodeBehavior, GenerateInput, PlanningBehavior, PromptsBehavior,
    RequirementsBehavior, StageBehavior, StoriesBehavior,
};
pub use deps::DependencyValidator;
pub use service::StageService;
pub use sink::{ArtifactSink, StorySink};
