//! Authoritative in-memory file tree of the generated project
//!
//! Every path is normalized to an absolute form under the sandbox working
//! directory before it touches the map. Writes that must reach the sandbox go
//! through [`FileStore::write_through`] so the execution queue stays the only
//! mediator of sandbox mutations.

use crate::error::{Result, WorkbenchError};
use crate::ports::Sandbox;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use workbench_types::{
    DiffStats, FileChange, FileEntry, FileHistory, FileMap, FileVersion, ModifiedFile,
};

/// Versions kept per path before the oldest are dropped
const MAX_VERSIONS: usize = 50;

/// Above this many line pairs the diff falls back to whole-file counts
const MAX_DIFF_CELLS: usize = 4_000_000;

pub struct FileStore {
    work_dir: String,
    files: RwLock<FileMap>,
    history: RwLock<HashMap<String, FileHistory>>,
    changes: broadcast::Sender<FileChange>,
}

impl FileStore {
    pub fn new(work_dir: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(1024);
        let work_dir = work_dir.into();
        let work_dir = if work_dir.len() > 1 {
            work_dir.trim_end_matches('/').to_string()
        } else {
            work_dir
        };
        Self {
            work_dir,
            files: RwLock::new(FileMap::new()),
            history: RwLock::new(HashMap::new()),
            changes,
        }
    }

    pub fn work_dir(&self) -> &str {
        &self.work_dir
    }

    /// Normalize a raw path to its absolute form under the working directory
    pub fn normalize(&self, path: &str) -> Result<String> {
        normalize_path(&self.work_dir, path)
    }

    /// Path relative to the working directory, `/`-separated
    pub fn relative(&self, path: &str) -> Result<String> {
        let absolute = self.normalize(path)?;
        let relative = pathdiff::diff_paths(Path::new(&absolute), Path::new(&self.work_dir))
            .ok_or_else(|| WorkbenchError::InvalidPath(absolute.clone()))?;
        Ok(relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileChange> {
        self.changes.subscribe()
    }

    pub async fn get(&self, path: &str) -> Option<FileEntry> {
        let path = self.normalize(path).ok()?;
        self.files.read().await.get(&path).cloned()
    }

    /// Text content of a non-binary file
    pub async fn content(&self, path: &str) -> Option<String> {
        self.get(path)
            .await
            .and_then(|entry| entry.text_content().map(str::to_string))
    }

    /// Create or overwrite an entry in memory only
    pub async fn set(&self, path: &str, entry: FileEntry) -> Result<()> {
        let path = self.normalize(path)?;
        if path == self.work_dir {
            return Err(WorkbenchError::InvalidPath(path));
        }

        let mut files = self.files.write().await;
        self.insert_parents(&mut files, &path);

        let change = match &entry {
            FileEntry::File { content, .. } => {
                let previous = files
                    .get(&path)
                    .and_then(|e| e.text_content())
                    .map(str::to_string);
                self.record_version(&path, previous.as_deref(), content).await;
                FileChange::Written { path: path.clone() }
            }
            FileEntry::Folder => FileChange::FolderCreated { path: path.clone() },
        };

        files.insert(path, entry);
        drop(files);

        let _ = self.changes.send(change);
        Ok(())
    }

    pub async fn set_content(&self, path: &str, content: impl Into<String>) -> Result<()> {
        self.set(path, FileEntry::text(content)).await
    }

    /// Remove an entry and, for folders, everything beneath it
    pub async fn delete(&self, path: &str) -> Result<bool> {
        let path = self.normalize(path)?;
        let prefix = format!("{}/", path);

        let mut files = self.files.write().await;
        let doomed: Vec<String> = files
            .keys()
            .filter(|p| **p == path || p.starts_with(&prefix))
            .cloned()
            .collect();

        if doomed.is_empty() {
            return Ok(false);
        }

        let mut history = self.history.write().await;
        for p in &doomed {
            if let Some(FileEntry::File { content, .. }) = files.remove(p) {
                history
                    .entry(p.clone())
                    .or_insert_with(|| FileHistory::new(content));
            }
        }
        drop(history);
        drop(files);

        debug!("Removed {} entries under {}", doomed.len(), path);
        let _ = self.changes.send(FileChange::Removed { path });
        Ok(true)
    }

    /// Write a file in memory and in the sandbox
    pub async fn write_through(
        &self,
        sandbox: &dyn Sandbox,
        path: &str,
        content: &str,
    ) -> Result<()> {
        let path = self.normalize(path)?;
        if let Some(parent) = Path::new(&path).parent() {
            let parent = parent.to_string_lossy();
            if parent != "/" {
                sandbox.mkdir(&parent).await?;
            }
        }
        sandbox.write_file(&path, content.as_bytes()).await?;
        self.set_content(&path, content).await?;
        debug!("Wrote {} ({} bytes) to sandbox", path, content.len());
        Ok(())
    }

    /// Remove a path in memory and in the sandbox
    pub async fn remove_through(&self, sandbox: &dyn Sandbox, path: &str) -> Result<()> {
        let path = self.normalize(path)?;
        sandbox.remove(&path).await?;
        self.delete(&path).await?;
        Ok(())
    }

    /// Replace the whole tree without recording history (session bootstrap)
    pub async fn load(&self, entries: FileMap) -> Result<()> {
        let mut normalized = FileMap::new();
        for (path, entry) in entries {
            let path = self.normalize(&path)?;
            self.insert_parents(&mut normalized, &path);
            normalized.insert(path, entry);
        }
        *self.files.write().await = normalized;
        self.history.write().await.clear();
        let _ = self.changes.send(FileChange::Reset);
        Ok(())
    }

    pub async fn snapshot(&self) -> FileMap {
        self.files.read().await.clone()
    }

    pub async fn file_count(&self) -> usize {
        self.files
            .read()
            .await
            .values()
            .filter(|e| !e.is_folder())
            .count()
    }

    pub async fn history(&self, path: &str) -> Option<FileHistory> {
        let path = self.normalize(path).ok()?;
        self.history.read().await.get(&path).cloned()
    }

    /// Files whose current content differs from their first-seen snapshot
    pub async fn modified_files(&self) -> Vec<ModifiedFile> {
        let files = self.files.read().await;
        let history = self.history.read().await;

        let mut modified: Vec<ModifiedFile> = history
            .iter()
            .filter_map(|(path, record)| {
                let current = files
                    .get(path)
                    .and_then(|e| e.text_content())
                    .map(str::to_string);
                if current.as_deref() == Some(record.original_content.as_str()) {
                    return None;
                }
                let stats = diff_stats(
                    &record.original_content,
                    current.as_deref().unwrap_or_default(),
                );
                Some(ModifiedFile {
                    path: path.clone(),
                    original_content: record.original_content.clone(),
                    current_content: current,
                    stats,
                })
            })
            .collect();

        modified.sort_by(|a, b| a.path.cmp(&b.path));
        modified
    }

    /// Restore a path to its first-seen content, returning it if there was one
    pub async fn reset_file(&self, path: &str) -> Result<Option<String>> {
        let path = self.normalize(path)?;
        let Some(record) = self.history.write().await.remove(&path) else {
            return Ok(None);
        };

        let mut files = self.files.write().await;
        self.insert_parents(&mut files, &path);
        files.insert(path.clone(), FileEntry::text(record.original_content.clone()));
        drop(files);

        let _ = self.changes.send(FileChange::Written { path });
        Ok(Some(record.original_content))
    }

    /// Forget all modification history (new chat/session)
    pub async fn reset_history(&self) {
        self.history.write().await.clear();
    }

    async fn record_version(&self, path: &str, previous: Option<&str>, content: &str) {
        let mut history = self.history.write().await;
        let record = history
            .entry(path.to_string())
            .or_insert_with(|| FileHistory::new(previous.unwrap_or_default()));

        if record.latest() == content {
            return;
        }

        record.versions.push(FileVersion {
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
        });
        if record.versions.len() > MAX_VERSIONS {
            let excess = record.versions.len() - MAX_VERSIONS;
            record.versions.drain(..excess);
        }
    }

    fn insert_parents(&self, files: &mut FileMap, path: &str) {
        let mut current = Path::new(path).parent();
        while let Some(dir) = current {
            let dir_str = dir.to_string_lossy().to_string();
            if dir_str.len() <= self.work_dir.len() {
                break;
            }
            files.entry(dir_str).or_insert(FileEntry::Folder);
            current = dir.parent();
        }
    }
}

/// Resolve `path` against `work_dir`, collapsing `.`, `..` and repeated slashes
pub fn normalize_path(work_dir: &str, path: &str) -> Result<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(WorkbenchError::InvalidPath(path.to_string()));
    }

    let joined = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/{}", work_dir, trimmed)
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(WorkbenchError::InvalidPath(path.to_string()));
                }
            }
            s => segments.push(s),
        }
    }

    let normalized = format!("/{}", segments.join("/"));
    let root = work_dir.trim_end_matches('/');
    let inside = root.is_empty()
        || normalized == root
        || normalized.starts_with(&format!("{}/", root));
    if !inside {
        return Err(WorkbenchError::InvalidPath(path.to_string()));
    }

    Ok(normalized)
}

/// Count added and deleted lines between two texts
pub fn diff_stats(old: &str, new: &str) -> DiffStats {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let prefix = old_lines
        .iter()
        .zip(&new_lines)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old_lines[prefix..]
        .iter()
        .rev()
        .zip(new_lines[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &old_lines[prefix..old_lines.len() - suffix];
    let b = &new_lines[prefix..new_lines.len() - suffix];

    if a.is_empty() || b.is_empty() || a.len() * b.len() > MAX_DIFF_CELLS {
        return DiffStats {
            additions: b.len(),
            deletions: a.len(),
        };
    }

    // Longest common subsequence, one row at a time
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for line in a {
        for (j, other) in b.iter().enumerate() {
            row[j + 1] = if line == other {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    let common = prev[b.len()];

    DiffStats {
        additions: b.len() - common,
        deletions: a.len() - common,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        let root = "/home/project";
        assert_eq!(
            normalize_path(root, "src/main.ts").unwrap(),
            "/home/project/src/main.ts"
        );
        assert_eq!(
            normalize_path(root, "/home/project//src/./lib/../main.ts").unwrap(),
            "/home/project/src/main.ts"
        );
        assert_eq!(normalize_path(root, "/home/project/").unwrap(), root);
        assert!(normalize_path(root, "../etc/passwd").is_err());
        assert!(normalize_path(root, "/etc/passwd").is_err());
        assert!(normalize_path(root, "  ").is_err());
    }

    #[test]
    fn test_diff_stats() {
        let stats = diff_stats("a\nb\nc\n", "a\nx\nc\nd\n");
        assert_eq!(stats.additions, 2);
        assert_eq!(stats.deletions, 1);
        assert_eq!(diff_stats("", "one\ntwo").additions, 2);
        assert_eq!(diff_stats("same", "same"), DiffStats::default());
    }

    #[tokio::test]
    async fn test_set_creates_parent_folders() {
        let store = FileStore::new("/home/project");
        store.set_content("src/components/App.tsx", "x").await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(
            snapshot.get("/home/project/src"),
            Some(&FileEntry::Folder)
        );
        assert_eq!(
            snapshot.get("/home/project/src/components"),
            Some(&FileEntry::Folder)
        );
        assert!(!snapshot.contains_key("/home/project"));
        assert_eq!(store.file_count().await, 1);
    }

    #[tokio::test]
    async fn test_lookup_normalizes_paths() {
        let store = FileStore::new("/home/project");
        store.set_content("/home/project/index.html", "<html>").await.unwrap();
        assert_eq!(
            store.content("./index.html").await.as_deref(),
            Some("<html>")
        );
        assert_eq!(
            store.relative("/home/project/src/../index.html").unwrap(),
            "index.html"
        );
    }

    #[tokio::test]
    async fn test_modified_files_against_first_snapshot() {
        let store = FileStore::new("/home/project");
        store
            .load(FileMap::from([(
                "/home/project/a.txt".to_string(),
                FileEntry::text("one\ntwo\n"),
            )]))
            .await
            .unwrap();

        store.set_content("a.txt", "one\n2\n").await.unwrap();
        store.set_content("a.txt", "one\n2\nthree\n").await.unwrap();
        store.set_content("b.txt", "new\n").await.unwrap();

        let modified = store.modified_files().await;
        assert_eq!(modified.len(), 2);
        assert_eq!(modified[0].path, "/home/project/a.txt");
        assert_eq!(modified[0].original_content, "one\ntwo\n");
        assert_eq!(modified[0].stats.additions, 2);
        assert_eq!(modified[0].stats.deletions, 1);
        assert_eq!(store.history("a.txt").await.unwrap().versions.len(), 2);

        // Writing the original back drops it from the view
        store.set_content("a.txt", "one\ntwo\n").await.unwrap();
        assert_eq!(store.modified_files().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_file_restores_original() {
        let store = FileStore::new("/home/project");
        store
            .load(FileMap::from([(
                "/home/project/a.txt".to_string(),
                FileEntry::text("v1"),
            )]))
            .await
            .unwrap();
        store.set_content("a.txt", "v2").await.unwrap();

        assert_eq!(store.reset_file("a.txt").await.unwrap().as_deref(), Some("v1"));
        assert_eq!(store.content("a.txt").await.as_deref(), Some("v1"));
        assert!(store.modified_files().await.is_empty());
        assert!(store.reset_file("a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_descendants() {
        let store = FileStore::new("/home/project");
        store.set_content("src/a.ts", "a").await.unwrap();
        store.set_content("src/lib/b.ts", "b").await.unwrap();
        store.set_content("srcx.ts", "c").await.unwrap();

        let mut changes = store.subscribe();
        assert!(store.delete("src").await.unwrap());
        assert!(!store.delete("src").await.unwrap());

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("/home/project/srcx.ts"));
        assert_eq!(
            changes.recv().await.unwrap(),
            FileChange::Removed {
                path: "/home/project/src".to_string()
            }
        );
    }
}
