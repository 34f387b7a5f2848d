//! Preview server types

use serde::{Deserialize, Serialize};

/// One reachable sandbox endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewInfo {
    pub port: u16,
    pub ready: bool,
    pub base_url: String,
}

/// Loading sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingPhase {
    Starting,
    FixingIssues,
}

/// Preview UX state; exactly one at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PreviewState {
    Idle,
    Loading { phase: LoadingPhase },
    CollectingErrors,
    ErrorsSurfaced,
    Ready,
}

impl PreviewState {
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            PreviewState::Loading { .. } | PreviewState::CollectingErrors
        )
    }

    pub fn loading_message(&self) -> Option<&'static str> {
        match self {
            PreviewState::Loading {
                phase: LoadingPhase::Starting,
            } => Some("Starting preview server..."),
            PreviewState::Loading {
                phase: LoadingPhase::FixingIssues,
            } => Some("Fixing issues..."),
            PreviewState::CollectingErrors => Some("Checking for errors..."),
            _ => None,
        }
    }
}
