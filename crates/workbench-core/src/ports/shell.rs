//! Shell used by the action runner

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub output: String,
    pub exit_code: i32,
}

/// A shell that can run a command to completion
#[async_trait]
pub trait CommandShell: Send + Sync {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;
}

/// Picks the shell an action runner dispatches to
#[async_trait]
pub trait ShellSource: Send + Sync {
    /// `None` while no shell session is attached
    async fn select_shell(&self) -> Option<Arc<dyn CommandShell>>;
}
