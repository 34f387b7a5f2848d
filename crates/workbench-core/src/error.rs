//! Error types for the workbench engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkbenchError>;

#[derive(Error, Debug)]
pub enum WorkbenchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("No runner shell attached yet")]
    RunnerNotReady,

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Terminal error: {0}")]
    Terminal(String),

    #[error("Command timed out after {seconds}s: {command}")]
    CommandTimeout { command: String, seconds: u64 },

    #[error("Execution queue is closed")]
    QueueClosed,

    #[error("Remote error ({operation}): {message}")]
    Remote { operation: String, message: String },

    #[error("Remote repository {0} no longer exists; reconnect before syncing")]
    RepositoryGone(String),

    #[error("No repository connected")]
    NotConnected,

    #[error("Repository {0} is disconnected")]
    Disconnected(String),

    #[error("Nothing to push: no files in the project")]
    NothingToPush,

    #[error("Nothing to push: no valid files left after applying ignore rules")]
    NoValidBlobs,

    #[error("Deploy error: {0}")]
    Deploy(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl WorkbenchError {
    pub fn remote(operation: impl Into<String>, message: impl ToString) -> Self {
        WorkbenchError::Remote {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Recoverable by retrying later without user involvement
    pub fn is_not_ready(&self) -> bool {
        matches!(self, WorkbenchError::RunnerNotReady)
    }
}

impl From<serde_json::Error> for WorkbenchError {
    fn from(e: serde_json::Error) -> Self {
        WorkbenchError::Serialization(e.to_string())
    }
}
