//! Identifier newtypes and the externally-visible artifact token.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id! {
    /// Identifier of a project.
    ProjectId
}

uuid_id! {
    /// Identifier of a stage artifact.
    ArtifactId
}

uuid_id! {
    /// Identifier of a review item.
    ReviewId
}

uuid_id! {
    /// Identifier of a user story.
    StoryId
}

/// Stable opaque token issued when an artifact is created.
///
/// Clients hold the token from the moment a generate request is accepted,
/// before any review exists, and use it to poll status. The token is
/// derived from the artifact id and creation instant so it never changes
/// over the artifact's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactToken(String);

impl ArtifactToken {
    const LEN: usize = 24;

    /// Issues a token for a freshly created artifact.
    #[must_use]
    pub fn issue(artifact: ArtifactId, created_at: chrono::DateTime<chrono::Utc>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(artifact.as_uuid().as_bytes());
        hasher.update(created_at.timestamp_micros().to_le_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..Self::LEN / 2]))
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
