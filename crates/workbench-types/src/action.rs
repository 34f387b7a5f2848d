//! Actions streamed by the AI layer

use serde::{Deserialize, Serialize};

/// One instruction within an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Create or overwrite a file with its full content
    File {
        #[serde(rename = "filePath")]
        file_path: String,
        content: String,
    },
    /// Run a command in the runner shell
    Shell { command: String },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::File { .. } => ActionKind::File,
            Action::Shell { .. } => ActionKind::Shell,
        }
    }

    /// Short human readable label used in logs
    pub fn label(&self) -> String {
        match self {
            Action::File { file_path, .. } => format!("file {}", file_path),
            Action::Shell { command } => {
                let first_line = command.lines().next().unwrap_or_default();
                format!("shell `{}`", first_line)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    File,
    Shell,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::File => write!(f, "file"),
            ActionKind::Shell => write!(f, "shell"),
        }
    }
}

/// A record of the AI action stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub artifact_id: String,
    pub action_id: String,
    pub action: Action,
    /// Policy gate set upstream; records with `false` are dropped
    #[serde(default = "default_should_execute")]
    pub should_execute: bool,
}

fn default_should_execute() -> bool {
    true
}

impl ActionRecord {
    pub fn new(artifact_id: impl Into<String>, action_id: impl Into<String>, action: Action) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            action_id: action_id.into(),
            action,
            should_execute: true,
        }
    }

    pub fn key(&self) -> ActionKey {
        ActionKey {
            artifact_id: self.artifact_id.clone(),
            action_id: self.action_id.clone(),
        }
    }
}

/// Identity of an action across artifacts
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionKey {
    pub artifact_id: String,
    pub action_id: String,
}

impl std::fmt::Display for ActionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.artifact_id, self.action_id)
    }
}

/// Execution status of an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Complete,
    Failed { error: String },
}

impl ActionStatus {
    /// Whether the action has reached a terminal state
    pub fn is_executed(&self) -> bool {
        matches!(self, ActionStatus::Complete | ActionStatus::Failed { .. })
    }
}

/// An action and its status, as tracked by a runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    pub action_id: String,
    pub action: Action,
    pub status: ActionStatus,
}
