//! Dependency validation for the fixed stage chain.

use std::sync::Arc;

use crate::core::{ArtifactStatus, StageType, UpstreamRef};
use crate::errors::{DependencyError, OrchestratorError, ValidationError};
use crate::store::{ArtifactStore, PipelineStore, ProjectStore, StoryStore};

/// Decides whether a stage may start from a given upstream reference.
///
/// Every status check here is an equality match against `Approved`.
/// Ordinal or range comparisons on the status enum are exactly the defect
/// this component exists to rule out: `Rejected` and `Failed` sit after
/// `Approved` in the ordinal table and must never count as "approved
/// enough".
#[derive(Debug, Clone)]
pub struct DependencyValidator {
    store: Arc<dyn PipelineStore>,
}

impl DependencyValidator {
    /// Creates a validator over the pipeline store.
    #[must_use]
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self { store }
    }

    /// Returns true when `stage` may start from `upstream`.
    pub async fn can_start(&self, stage: StageType, upstream: &UpstreamRef) -> bool {
        self.check(stage, upstream).await.is_ok()
    }

    /// Like [`can_start`](Self::can_start) but with the failing reason.
    pub async fn check(
        &self,
        stage: StageType,
        upstream: &UpstreamRef,
    ) -> Result<(), OrchestratorError> {
        match (stage, upstream) {
            (StageType::Requirements, UpstreamRef::Project { project }) => {
                let exists = self
                    .store
                    .project(*project)
                    .await
                    .map_err(OrchestratorError::from_store)?
                    .is_some();
                if exists {
                    Ok(())
                } else {
                    Err(DependencyError::UpstreamMissing {
                        stage,
                        upstream: upstream.clone(),
                    }
                    .into())
                }
            }

            (StageType::Planning | StageType::Stories | StageType::Code, UpstreamRef::Artifact { artifact }) => {
                self.require_approved_artifact(stage, upstream, *artifact)
                    .await
            }

            (StageType::Prompts, UpstreamRef::Story { artifact, story }) => {
                self.require_approved_artifact(stage, upstream, *artifact)
                    .await?;

                let story_row = self
                    .store
                    .story(*story)
                    .await
                    .map_err(OrchestratorError::from_store)?
                    .filter(|row| row.artifact == *artifact)
                    .ok_or_else(|| DependencyError::UpstreamMissing {
                        stage,
                        upstream: upstream.clone(),
                    })?;

                if story_row.status == ArtifactStatus::Approved {
                    Ok(())
                } else {
                    Err(DependencyError::StoryNotApproved {
                        story: *story,
                        status: story_row.status,
                    }
                    .into())
                }
            }

            _ => Err(ValidationError::UpstreamShape {
                stage,
                upstream: upstream.clone(),
            }
            .into()),
        }
    }

    async fn require_approved_artifact(
        &self,
        stage: StageType,
        upstream: &UpstreamRef,
        artifact: crate::core::ArtifactId,
    ) -> Result<(), OrchestratorError> {
        let row = self
            .store
            .artifact(artifact)
            .await
            .map_err(OrchestratorError::from_store)?
            .ok_or_else(|| DependencyError::UpstreamMissing {
                stage,
                upstream: upstream.clone(),
            })?;

        // The upstream must come from the immediately preceding stage.
        let expected = stage.upstream_stage().unwrap_or(stage);
        if row.stage != expected {
            return Err(DependencyError::WrongUpstreamStage {
                stage,
                expected,
                found: row.stage,
            }
            .into());
        }

        if row.status == ArtifactStatus::Approved {
            Ok(())
        } else {
            Err(DependencyError::UpstreamNotApproved {
                stage,
                artifact,
                status: row.status,
            }
            .into())
        }
    }
}
