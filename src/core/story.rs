//! User stories: independently approvable children of a stories artifact.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ids::{ArtifactId, ReviewId, StoryId};
use super::status::ArtifactStatus;

/// A user story parsed out of a stories artifact's generated content.
///
/// A story carries its own status: approving a story does not approve the
/// parent artifact, and parent approval does not approve the story. The
/// parent gates advancing to prompt generation in general; the story's own
/// approval gates prompt generation for that specific story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStory {
    /// Story identifier.
    pub id: StoryId,
    /// The stories artifact this story belongs to.
    pub artifact: ArtifactId,
    /// Story title.
    pub title: String,
    /// The "as a ... I want ... so that ..." narrative body.
    pub narrative: String,
    /// Acceptance criteria bullet points.
    pub acceptance_criteria: Vec<String>,
    /// Independent lifecycle status.
    pub status: ArtifactStatus,
    /// The review gating this story, once opened.
    pub review: Option<ReviewId>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

impl UserStory {
    /// Creates a story in the `NotStarted` state.
    ///
    /// Stories sit at `NotStarted` until the parent artifact is approved,
    /// at which point each story gets its own review and moves to
    /// `PendingReview`.
    #[must_use]
    pub fn new(artifact: ArtifactId, title: impl Into<String>, narrative: impl Into<String>) -> Self {
        Self {
            id: StoryId::new(),
            artifact,
            title: title.into(),
            narrative: narrative.into(),
            acceptance_criteria: Vec::new(),
            status: ArtifactStatus::NotStarted,
            review: None,
            created_at: Utc::now(),
        }
    }
}

/// Splits generated story text into individual [`UserStory`] records.
///
/// Generated content follows the story-listing prompt format: each story
/// opens with a `Story N:` or markdown `## Story N:` heading, followed by
/// the narrative and an optional `Acceptance Criteria` bullet list. Text
/// before the first heading (preamble chatter) is ignored. Returns an
/// empty vector when no heading is present.
#[must_use]
pub fn parse_stories(artifact: ArtifactId, content: &str) -> Vec<UserStory> {
    // Unwrap is fine: the pattern is a compile-time constant.
    #[allow(clippy::unwrap_used)]
    let heading = Regex::new(r"(?mi)^\s*(?:#{1,4}\s*)?(?:user\s+)?story\s*\d*\s*[:.\-]\s*(.+)$")
        .unwrap();
    #[allow(clippy::unwrap_used)]
    let criteria_heading = Regex::new(r"(?i)^\s*(?:#{1,4}\s*)?acceptance\s+criteria\s*:?\s*$")
        .unwrap();
    #[allow(clippy::unwrap_used)]
    let bullet = Regex::new(r"^\s*(?:[-*]|\d+[.)])\s+(.+)$").unwrap();

    let mut stories: Vec<UserStory> = Vec::new();
    let mut in_criteria = false;

    for line in content.lines() {
        if let Some(captures) = heading.captures(line) {
            let title = captures[1].trim().to_string();
            stories.push(UserStory::new(artifact, title, String::new()));
            in_criteria = false;
            continue;
        }

        let Some(current) = stories.last_mut() else {
            continue;
        };

        if criteria_heading.is_match(line) {
            in_criteria = true;
            continue;
        }

        if in_criteria {
            if let Some(captures) = bullet.captures(line) {
                current.acceptance_criteria.push(captures[1].trim().to_string());
                continue;
            }
            if !line.trim().is_empty() {
                in_criteria = false;
            }
        }

        if !in_criteria && !line.trim().is_empty() {
            if !current.narrative.is_empty() {
                current.narrative.push('\n');
            }
            current.narrative.push_str(line.trim());
        }
    }

    stories
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "\
Here are the user stories for your project.

## Story 1: Account registration
As a visitor, I want to register an account so that I can save my work.

Acceptance Criteria:
- Email and password are validated
- A confirmation email is sent

## Story 2: Password reset
As a user, I want to reset my password so that I can regain access.

Acceptance Criteria:
1. Reset link expires after one hour
2. Old sessions are invalidated
";

    #[test]
    fn test_parse_two_stories() {
        let artifact = ArtifactId::new();
        let stories = parse_stories(artifact, SAMPLE);

        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].title, "Account registration");
        assert_eq!(stories[1].title, "Password reset");
        assert_eq!(stories[0].artifact, artifact);
    }

    #[test]
    fn test_parse_narrative_and_criteria() {
        let stories = parse_stories(ArtifactId::new(), SAMPLE);

        assert!(stories[0].narrative.starts_with("As a visitor"));
        assert_eq!(
            stories[0].acceptance_criteria,
            vec![
                "Email and password are validated".to_string(),
                "A confirmation email is sent".to_string(),
            ]
        );
        assert_eq!(stories[1].acceptance_criteria.len(), 2);
    }

    #[test]
    fn test_parsed_stories_start_not_started() {
        let stories = parse_stories(ArtifactId::new(), SAMPLE);
        assert!(stories
            .iter()
            .all(|story| story.status == ArtifactStatus::NotStarted));
    }

    #[test]
    fn test_plain_heading_without_markdown() {
        let stories = parse_stories(
            ArtifactId::new(),
            "Story 1: Login\nAs a user I want to log in.\n",
        );
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].title, "Login");
    }

    #[test]
    fn test_no_headings_yields_empty() {
        let stories = parse_stories(ArtifactId::new(), "free-form text with no structure");
        assert!(stories.is_empty());
    }

    #[test]
    fn test_preamble_is_ignored() {
        let stories = parse_stories(ArtifactId::new(), SAMPLE);
        assert!(!stories[0].narrative.contains("Here are the user stories"));
    }
}
