//! Version-control sync types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sync state for one chat/session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitMetadata {
    /// `owner/name` of the remote repository
    pub remote_url: String,
    pub branch: String,
    /// Commit SHAs, oldest first; only ever appended to or replaced by a fresh fetch
    pub commit_history: Vec<String>,
    pub disconnected: bool,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl GitMetadata {
    pub fn new(remote_url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            branch: branch.into(),
            commit_history: Vec::new(),
            disconnected: false,
            last_synced_at: None,
        }
    }

    pub fn last_known_sha(&self) -> Option<&str> {
        self.commit_history.last().map(String::as_str)
    }

    pub fn knows(&self, sha: &str) -> bool {
        self.commit_history.iter().any(|s| s == sha)
    }
}

/// Opaque credentials supplied by the auth collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCredentials {
    pub owner: String,
    pub token: String,
}

/// Change status of a file in a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Removed,
    Renamed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitFile {
    pub path: String,
    pub status: ChangeStatus,
    /// Previous path for renames
    #[serde(default)]
    pub previous_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub tree_sha: String,
    pub parents: Vec<String>,
    #[serde(default)]
    pub files: Vec<CommitFile>,
}

/// Externally made commit, ready to merge into the file tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUpdate {
    pub sha: String,
    pub message: String,
    /// (relative path, content)
    pub added: Vec<(String, String)>,
    pub changed: Vec<(String, String)>,
    pub removed: Vec<String>,
}

impl RemoteUpdate {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Summary of a successful push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    pub commit_sha: String,
    pub files_pushed: usize,
    pub files_ignored: usize,
}
