//! The fixed pipeline stage sequence.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five fixed pipeline stages, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    /// Requirements analysis: project description in, requirements out.
    Requirements,
    /// Project planning: requirements in, plan out.
    Planning,
    /// Story generation: plan in, user stories out.
    Stories,
    /// Prompt generation: one approved story in, a coding prompt out.
    Prompts,
    /// Code generation: prompt artifact in, code out.
    Code,
}

impl StageType {
    /// All stages in pipeline order.
    pub const ORDER: [StageType; 5] = [
        Self::Requirements,
        Self::Planning,
        Self::Stories,
        Self::Prompts,
        Self::Code,
    ];

    /// The stage whose approved artifact this stage consumes, if any.
    #[must_use]
    pub fn upstream_stage(self) -> Option<StageType> {
        match self {
            Self::Requirements => None,
            Self::Planning => Some(Self::Requirements),
            Self::Stories => Some(Self::Planning),
            Self::Prompts => Some(Self::Stories),
            Self::Code => Some(Self::Prompts),
        }
    }

    /// The stage unlocked by approving this stage's artifact, if any.
    #[must_use]
    pub fn next_stage(self) -> Option<StageType> {
        match self {
            Self::Requirements => Some(Self::Planning),
            Self::Planning => Some(Self::Stories),
            Self::Stories => Some(Self::Prompts),
            Self::Prompts => Some(Self::Code),
            Self::Code => None,
        }
    }

    /// Returns true for the pipeline entry stage.
    #[must_use]
    pub fn is_first(self) -> bool {
        matches!(self, Self::Requirements)
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requirements => write!(f, "requirements"),
            Self::Planning => write!(f, "planning"),
            Self::Stories => write!(f, "stories"),
            Self::Prompts => write!(f, "prompts"),
            Self::Code => write!(f, "code"),
        }
    }
}
