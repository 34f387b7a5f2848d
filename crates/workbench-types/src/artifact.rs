//! Artifact types

use serde::{Deserialize, Serialize};

/// What an artifact represents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Regular AI response
    #[default]
    Response,
    /// Bundled project template imported at session start
    Bundled,
}

/// Partial update of an artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPatch {
    pub title: Option<String>,
    pub closed: Option<bool>,
}

impl ArtifactPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            closed: None,
        }
    }

    pub fn closed() -> Self {
        Self {
            title: None,
            closed: Some(true),
        }
    }
}

/// Artifact summary for front ends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    pub id: String,
    pub title: String,
    pub kind: ArtifactKind,
    pub closed: bool,
    pub actions: Vec<crate::ActionState>,
}
