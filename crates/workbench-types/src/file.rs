//! Project file tree types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node of the project file tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileEntry {
    File {
        content: String,
        #[serde(default, rename = "isBinary")]
        is_binary: bool,
    },
    Folder,
}

impl FileEntry {
    pub fn text(content: impl Into<String>) -> Self {
        FileEntry::File {
            content: content.into(),
            is_binary: false,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, FileEntry::Folder)
    }

    /// Text content of a non-binary file
    pub fn text_content(&self) -> Option<&str> {
        match self {
            FileEntry::File {
                content,
                is_binary: false,
            } => Some(content),
            _ => None,
        }
    }
}

/// Normalized absolute path -> entry, ordered so parents precede children
pub type FileMap = BTreeMap<String, FileEntry>;

/// Per-path modification record for the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHistory {
    /// Content when the path was first modified (empty for new files)
    pub original_content: String,
    /// Every content written since, oldest first
    pub versions: Vec<FileVersion>,
}

impl FileHistory {
    pub fn new(original_content: impl Into<String>) -> Self {
        Self {
            original_content: original_content.into(),
            versions: Vec::new(),
        }
    }

    pub fn latest(&self) -> &str {
        self.versions
            .last()
            .map(|v| v.content.as_str())
            .unwrap_or(&self.original_content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersion {
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Line-based diff size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
}

/// A path whose content differs from its first-seen snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedFile {
    pub path: String,
    pub original_content: String,
    pub current_content: Option<String>,
    pub stats: DiffStats,
}

/// Change notification emitted by the file store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileChange {
    Written { path: String },
    FolderCreated { path: String },
    Removed { path: String },
    Reset,
}

impl FileChange {
    pub fn path(&self) -> Option<&str> {
        match self {
            FileChange::Written { path }
            | FileChange::FolderCreated { path }
            | FileChange::Removed { path } => Some(path),
            FileChange::Reset => None,
        }
    }
}
