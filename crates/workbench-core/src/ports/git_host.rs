//! Git hosting REST API

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use workbench_types::CommitInfo;

/// Blob reference inside a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    pub sha: String,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644".to_string(),
            sha: sha.into(),
        }
    }
}

/// Operations against one remote repository
///
/// Implementations return `WorkbenchError::RepositoryGone` when the repository
/// itself no longer exists and `WorkbenchError::Remote` for every other failure.
#[async_trait]
pub trait GitHost: Send + Sync {
    /// Tip SHA of a branch
    async fn get_ref(&self, branch: &str) -> Result<String>;

    /// Upload content, returning its blob SHA
    async fn create_blob(&self, content: &[u8]) -> Result<String>;

    /// Create a tree on top of `base_tree`, returning its SHA
    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> Result<String>;

    async fn create_commit(&self, tree: &str, parents: &[String], message: &str) -> Result<String>;

    /// Move a branch to `sha`
    async fn update_ref(&self, branch: &str, sha: &str) -> Result<()>;

    /// Commits reachable from `branch`, newest first
    async fn list_commits(&self, branch: &str) -> Result<Vec<String>>;

    async fn get_commit(&self, sha: &str) -> Result<CommitInfo>;

    /// Text content of `path` at `git_ref`; `None` when the file is binary
    async fn get_content(&self, path: &str, git_ref: &str) -> Result<Option<String>>;
}
