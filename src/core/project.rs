//! Projects: the root entity first-stage artifacts attach to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ProjectId;

/// A project owning one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Project identifier.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Free-form description fed into requirements analysis.
    pub description: String,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Creates a new project.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_creation() {
        let project = Project::new("todo app", "a simple todo application");
        assert_eq!(project.name, "todo app");
        assert_eq!(project.description, "a simple todo application");
    }
}
