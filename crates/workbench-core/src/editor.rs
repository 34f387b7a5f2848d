//! Open-document state layered on top of the file store

use crate::error::{Result, WorkbenchError};
use crate::files::FileStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use workbench_types::FileChange;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub top: f64,
    pub left: f64,
}

/// Live view of one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorDocument {
    pub file_path: String,
    pub value: String,
    pub scroll: ScrollPosition,
    pub dirty: bool,
}

#[derive(Default)]
struct EditorState {
    documents: HashMap<String, EditorDocument>,
    selected: Option<String>,
    dirty: BTreeSet<String>,
}

pub struct EditorDocumentStore {
    files: Arc<FileStore>,
    state: RwLock<EditorState>,
}

impl EditorDocumentStore {
    pub fn new(files: Arc<FileStore>) -> Self {
        Self {
            files,
            state: RwLock::new(EditorState::default()),
        }
    }

    /// Refresh documents from the file store, keeping unsaved edits
    pub async fn sync_from_files(&self) {
        let snapshot = self.files.snapshot().await;
        let mut state = self.state.write().await;

        state
            .documents
            .retain(|path, _| snapshot.get(path).is_some_and(|e| !e.is_folder()));

        for (path, entry) in &snapshot {
            let Some(content) = entry.text_content() else {
                continue;
            };
            let dirty = state.dirty.contains(path);
            let doc = state
                .documents
                .entry(path.clone())
                .or_insert_with(|| EditorDocument {
                    file_path: path.clone(),
                    value: content.to_string(),
                    scroll: ScrollPosition::default(),
                    dirty: false,
                });
            if !dirty {
                doc.value = content.to_string();
            }
        }

        let EditorState {
            documents,
            selected,
            dirty,
        } = &mut *state;
        dirty.retain(|path| documents.contains_key(path));
        if selected.as_ref().is_some_and(|s| !documents.contains_key(s)) {
            *selected = None;
        }
    }

    /// Apply a file store change notification
    pub async fn apply_change(&self, change: &FileChange) {
        match change {
            FileChange::Written { path } => {
                let Some(content) = self.files.content(path).await else {
                    return;
                };
                let mut state = self.state.write().await;
                let dirty = state.dirty.contains(path);
                let doc = state
                    .documents
                    .entry(path.clone())
                    .or_insert_with(|| EditorDocument {
                        file_path: path.clone(),
                        value: content.clone(),
                        scroll: ScrollPosition::default(),
                        dirty: false,
                    });
                if !dirty {
                    doc.value = content;
                }
            }
            FileChange::FolderCreated { .. } => {}
            FileChange::Removed { .. } | FileChange::Reset => self.sync_from_files().await,
        }
    }

    pub async fn select(&self, path: &str) -> Result<()> {
        let path = self.files.normalize(path)?;
        let mut state = self.state.write().await;
        if !state.documents.contains_key(&path) {
            return Err(WorkbenchError::InvalidPath(path));
        }
        state.selected = Some(path);
        Ok(())
    }

    pub async fn selected(&self) -> Option<String> {
        self.state.read().await.selected.clone()
    }

    pub async fn current_document(&self) -> Option<EditorDocument> {
        let state = self.state.read().await;
        let selected = state.selected.as_ref()?;
        state.documents.get(selected).cloned()
    }

    pub async fn document(&self, path: &str) -> Option<EditorDocument> {
        let path = self.files.normalize(path).ok()?;
        self.state.read().await.documents.get(&path).cloned()
    }

    /// Record live (unsaved) content; dirty unless it matches the store
    pub async fn update_content(&self, path: &str, value: impl Into<String>) -> Result<()> {
        let path = self.files.normalize(path)?;
        let value = value.into();
        let stored = self.files.content(&path).await;

        let mut state = self.state.write().await;
        let doc = state
            .documents
            .get_mut(&path)
            .ok_or_else(|| WorkbenchError::InvalidPath(path.clone()))?;
        doc.value = value;
        doc.dirty = stored.as_deref() != Some(doc.value.as_str());
        let dirty = doc.dirty;

        if dirty {
            state.dirty.insert(path);
        } else {
            state.dirty.remove(&path);
        }
        Ok(())
    }

    pub async fn update_scroll(&self, path: &str, scroll: ScrollPosition) -> Result<()> {
        let path = self.files.normalize(path)?;
        let mut state = self.state.write().await;
        if let Some(doc) = state.documents.get_mut(&path) {
            doc.scroll = scroll;
        }
        Ok(())
    }

    /// Live content to persist for `path`, if it has unsaved edits
    pub async fn pending_save(&self, path: &str) -> Result<Option<String>> {
        let path = self.files.normalize(path)?;
        let state = self.state.read().await;
        if !state.dirty.contains(&path) {
            return Ok(None);
        }
        Ok(state.documents.get(&path).map(|d| d.value.clone()))
    }

    /// Clear dirtiness once the live content has been written to the store
    pub async fn mark_saved(&self, path: &str) -> Result<()> {
        let path = self.files.normalize(path)?;
        let mut state = self.state.write().await;
        state.dirty.remove(&path);
        if let Some(doc) = state.documents.get_mut(&path) {
            doc.dirty = false;
        }
        debug!("Saved document {}", path);
        Ok(())
    }

    /// Write live content into the file store (memory only) and clear dirtiness
    pub async fn save(&self, path: &str) -> Result<bool> {
        let Some(value) = self.pending_save(path).await? else {
            return Ok(false);
        };
        self.files.set_content(path, value).await?;
        self.mark_saved(path).await?;
        Ok(true)
    }

    /// Discard live edits and reload from the file store
    pub async fn reset(&self, path: &str) -> Result<()> {
        let path = self.files.normalize(path)?;
        let stored = self.files.content(&path).await;
        let mut state = self.state.write().await;
        state.dirty.remove(&path);
        if let Some(doc) = state.documents.get_mut(&path) {
            doc.value = stored.unwrap_or_default();
            doc.dirty = false;
        }
        Ok(())
    }

    pub async fn dirty_paths(&self) -> Vec<String> {
        self.state.read().await.dirty.iter().cloned().collect()
    }
}
