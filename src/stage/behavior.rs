//! Per-stage behaviors plugged into the generic stage service.
//!
//! The service owns the lifecycle (slot claim, gateway call, review
//! hand-off); a behavior contributes only what differs between stages:
//! input validation, the prompt shaped from approved upstream content,
//! and any post-processing of the generated text.

use std::sync::Arc;

use crate::core::{parse_stories, ArtifactId, StageType, UserStory};
use crate::errors::ValidationError;

/// Caller-supplied input to a generate request.
#[derive(Debug, Clone, Default)]
pub struct GenerateInput {
    /// Free-form guidance folded into the prompt. Required for the first
    /// stage, optional afterwards where the approved upstream content is
    /// the real driver.
    pub brief: String,
    /// Preferred models, handed to fallback-aware gateway decorators.
    pub model_hints: Vec<String>,
}

impl GenerateInput {
    /// Creates an input with the given brief.
    #[must_use]
    pub fn new(brief: impl Into<String>) -> Self {
        Self {
            brief: brief.into(),
            model_hints: Vec::new(),
        }
    }

    /// An empty input, for stages driven purely by upstream content.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sets the model hints.
    #[must_use]
    pub fn with_model_hints(mut self, hints: Vec<String>) -> Self {
        self.model_hints = hints;
        self
    }
}

/// The stage-specific half of the stage service.
pub trait StageBehavior: Send + Sync + std::fmt::Debug {
    /// Which pipeline stage this behavior implements.
    fn stage(&self) -> StageType;

    /// Validates the caller's input before any state is written.
    fn validate(&self, _input: &GenerateInput) -> Result<(), ValidationError> {
        Ok(())
    }

    /// System instructions sent alongside every prompt for this stage.
    fn system_context(&self) -> &'static str;

    /// Shapes the prompt from the approved upstream content and the
    /// caller's brief.
    fn build_prompt(&self, upstream: &str, input: &GenerateInput) -> String;

    /// Extracts child records from the generated text.
    ///
    /// Only the stories behavior produces anything here.
    fn extract_stories(&self, _artifact: ArtifactId, _content: &str) -> Vec<UserStory> {
        Vec::new()
    }
}

/// Returns the behavior for a stage.
#[must_use]
pub fn behavior_for(stage: StageType) -> Arc<dyn StageBehavior> {
    match stage {
        StageType::Requirements => Arc::new(RequirementsBehavior),
        StageType::Planning => Arc::new(PlanningBehavior),
        StageType::Stories => Arc::new(StoriesBehavior),
        StageType::Prompts => Arc::new(PromptsBehavior),
        StageType::Code => Arc::new(CodeBehavior),
    }
}

fn guidance_block(input: &GenerateInput) -> String {
    if input.brief.trim().is_empty() {
        String::new()
    } else {
        format!("\n\nAdditional guidance from the requester:\n{}", input.brief.trim())
    }
}

/// Requirements analysis from the project description.
#[derive(Debug, Clone, Copy)]
pub struct RequirementsBehavior;

impl StageBehavior for RequirementsBehavior {
    fn stage(&self) -> StageType {
        StageType::Requirements
    }

    fn validate(&self, input: &GenerateInput) -> Result<(), ValidationError> {
        // The first stage has no upstream artifact to fall back on.
        if input.brief.trim().is_empty() {
            return Err(ValidationError::EmptyInput {
                stage: StageType::Requirements,
            });
        }
        Ok(())
    }

    fn system_context(&self) -> &'static str {
        "You are a requirements analyst. Produce a structured requirements \
         document: goals, functional requirements, non-functional requirements, \
         constraints, and open questions."
    }

    fn build_prompt(&self, upstream: &str, input: &GenerateInput) -> String {
        format!(
            "Analyze the following project and write its requirements.\n\n\
             Project description:\n{upstream}\n\n\
             Requester brief:\n{}",
            input.brief.trim()
        )
    }
}

/// Project planning from approved requirements.
#[derive(Debug, Clone, Copy)]
pub struct PlanningBehavior;

impl StageBehavior for PlanningBehavior {
    fn stage(&self) -> StageType {
        StageType::Planning
    }

    fn system_context(&self) -> &'static str {
        "You are a technical project planner. Produce a phased delivery plan: \
         architecture outline, milestones, and the order of work."
    }

    fn build_prompt(&self, upstream: &str, input: &GenerateInput) -> String {
        format!(
            "Create a project plan for the approved requirements below.\n\n\
             Approved requirements:\n{upstream}{}",
            guidance_block(input)
        )
    }
}

/// Story generation from an approved plan.
///
/// The generated text is parsed into individually reviewable
/// [`UserStory`] records; the listing format the prompt asks for is the
/// same one [`parse_stories`] understands.
#[derive(Debug, Clone, Copy)]
pub struct StoriesBehavior;

impl StageBehavior for StoriesBehavior {
    fn stage(&self) -> StageType {
        StageType::Stories
    }

    fn system_context(&self) -> &'static str {
        "You are an agile analyst. Break the plan into user stories. Format \
         each as '## Story N: <title>' followed by the 'As a ... I want ... \
         so that ...' narrative and an 'Acceptance Criteria:' bullet list."
    }

    fn build_prompt(&self, upstream: &str, input: &GenerateInput) -> String {
        format!(
            "Write the user stories for the approved plan below.\n\n\
             Approved plan:\n{upstream}{}",
            guidance_block(input)
        )
    }

    fn extract_stories(&self, artifact: ArtifactId, content: &str) -> Vec<UserStory> {
        parse_stories(artifact, content)
    }
}

/// Prompt generation for one approved story.
#[derive(Debug, Clone, Copy)]
pub struct PromptsBehavior;

impl StageBehavior for PromptsBehavior {
    fn stage(&self) -> StageType {
        StageType::Prompts
    }

    fn system_context(&self) -> &'static str {
        "You are a prompt engineer. Turn the user story into a precise, \
         self-contained implementation prompt for a code-generation model."
    }

    fn build_prompt(&self, upstream: &str, input: &GenerateInput) -> String {
        format!(
            "Write the implementation prompt for this approved user story.\n\n\
             {upstream}{}",
            guidance_block(input)
        )
    }
}

/// Code generation from an approved implementation prompt.
#[derive(Debug, Clone, Copy)]
pub struct CodeBehavior;

impl StageBehavior for CodeBehavior {
    fn stage(&self) -> StageType {
        StageType::Code
    }

    fn system_context(&self) -> &'static str {
        "You are a software engineer. Implement exactly what the prompt asks \
         for, with production-quality code and brief usage notes."
    }

    fn build_prompt(&self, upstream: &str, input: &GenerateInput) -> String {
        format!(
            "Generate the code for the approved implementation prompt below.\n\n\
             Implementation prompt:\n{upstream}{}",
            guidance_block(input)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_behavior_for_covers_every_stage() {
        for stage in StageType::ORDER {
            assert_eq!(behavior_for(stage).stage(), stage);
        }
    }

    #[test]
    fn test_requirements_rejects_empty_brief() {
        let err = RequirementsBehavior
            .validate(&GenerateInput::new("   "))
            .unwrap_err();
        assert!(matches!(err, ValidationError::EmptyInput { .. }));
        assert!(RequirementsBehavior
            .validate(&GenerateInput::new("a todo app"))
            .is_ok());
    }

    #[test]
    fn test_downstream_stages_accept_empty_brief() {
        assert!(PlanningBehavior.validate(&GenerateInput::empty()).is_ok());
        assert!(CodeBehavior.validate(&GenerateInput::empty()).is_ok());
    }

    #[test]
    fn test_prompt_includes_upstream_and_guidance() {
        let prompt = PlanningBehavior.build_prompt(
            "the requirements text",
            &GenerateInput::new("keep it to two phases"),
        );
        assert!(prompt.contains("the requirements text"));
        assert!(prompt.contains("keep it to two phases"));

        let bare = PlanningBehavior.build_prompt("reqs", &GenerateInput::empty());
        assert!(!bare.contains("Additional guidance"));
    }

    #[test]
    fn test_stories_behavior_extracts_stories() {
        let artifact = ArtifactId::new();
        let stories = StoriesBehavior.extract_stories(
            artifact,
            "## Story 1: Login\nAs a user, I want to log in.\n",
        );
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].artifact, artifact);
    }

    #[test]
    fn test_non_story_behaviors_extract_nothing() {
        assert!(CodeBehavior
            .extract_stories(ArtifactId::new(), "## Story 1: x")
            .is_empty());
    }
}
