//! Remote git mirror of the file tree
//!
//! Push builds one commit from the whole non-ignored tree on top of the
//! remote branch tip. Polling compares the remote tip against the stored
//! commit history and turns unseen commits into [`RemoteUpdate`]s. Push and
//! poll ticks hold the same lock so they never overlap.

pub mod ignore;

pub use ignore::IgnoreRules;

use crate::error::{Result, WorkbenchError};
use crate::files::FileStore;
use crate::ports::{GitHost, MetadataStore, TreeEntry};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use workbench_types::{ChangeStatus, FileEntry, GitMetadata, PushOutcome, RemoteUpdate};

const GITIGNORE: &str = ".gitignore";

pub struct VersionControlSync {
    session_id: String,
    host: Arc<dyn GitHost>,
    store: Arc<dyn MetadataStore>,
    files: Arc<FileStore>,
    /// Local blob SHA -> SHA the host returned for it
    uploaded: Mutex<HashMap<String, String>>,
    op_lock: Mutex<()>,
}

impl VersionControlSync {
    pub fn new(
        session_id: impl Into<String>,
        host: Arc<dyn GitHost>,
        store: Arc<dyn MetadataStore>,
        files: Arc<FileStore>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            host,
            store,
            files,
            uploaded: Mutex::new(HashMap::new()),
            op_lock: Mutex::new(()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn metadata(&self) -> Result<Option<GitMetadata>> {
        self.store.get(&self.session_id).await
    }

    /// Link the session to `remote_url` and record the branch's history
    pub async fn connect(&self, remote_url: &str, branch: &str) -> Result<GitMetadata> {
        let _guard = self.op_lock.lock().await;
        let mut metadata = GitMetadata::new(remote_url, branch);
        metadata.commit_history = self.fetch_history(branch).await?;
        self.store.put(&self.session_id, &metadata).await?;
        info!(
            "Connected session {} to {} ({})",
            self.session_id, remote_url, branch
        );
        Ok(metadata)
    }

    /// Clear a disconnected state after the user re-established the repository
    pub async fn reconnect(&self) -> Result<GitMetadata> {
        let _guard = self.op_lock.lock().await;
        let mut metadata = self
            .store
            .get(&self.session_id)
            .await?
            .ok_or(WorkbenchError::NotConnected)?;

        metadata.commit_history = self.fetch_history(&metadata.branch).await?;
        metadata.disconnected = false;
        self.store.put(&self.session_id, &metadata).await?;
        info!("Reconnected session {} to {}", self.session_id, metadata.remote_url);
        Ok(metadata)
    }

    /// Forget the remote link entirely
    pub async fn disconnect(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.store.delete(&self.session_id).await?;
        self.uploaded.lock().await.clear();
        Ok(())
    }

    /// Commit the current tree to the connected branch
    pub async fn push(&self, message: &str) -> Result<PushOutcome> {
        let _guard = self.op_lock.lock().await;
        let metadata = self.connected_metadata().await?;
        let result = self.push_tree(metadata.clone(), message).await;
        self.note_gone(metadata, result).await
    }

    async fn push_tree(&self, mut metadata: GitMetadata, message: &str) -> Result<PushOutcome> {
        let snapshot = self.files.snapshot().await;
        let candidates: Vec<(String, &str)> = snapshot
            .iter()
            .filter_map(|(path, entry)| match entry {
                FileEntry::File {
                    content,
                    is_binary: false,
                } => Some((path.clone(), content.as_str())),
                _ => None,
            })
            .collect();
        if candidates.is_empty() {
            return Err(WorkbenchError::NothingToPush);
        }

        let gitignore = self.files.content(GITIGNORE).await;
        let rules = IgnoreRules::parse(gitignore.as_deref());

        let mut selected = Vec::new();
        for (path, content) in &candidates {
            let relative = self.files.relative(path)?;
            if !relative.is_empty() && !rules.is_ignored(&relative) {
                selected.push((relative, *content));
            }
        }
        let files_ignored = candidates.len() - selected.len();
        if selected.is_empty() {
            return Err(WorkbenchError::NoValidBlobs);
        }

        let branch = metadata.branch.clone();
        let tip = self.host.get_ref(&branch).await?;
        let base = self.host.get_commit(&tip).await?;

        let mut entries = Vec::with_capacity(selected.len());
        for (path, content) in &selected {
            let sha = self.upload_blob(content.as_bytes()).await?;
            entries.push(TreeEntry::blob(path.clone(), sha));
        }

        let tree = self.host.create_tree(&base.tree_sha, &entries).await?;
        let commit = self
            .host
            .create_commit(&tree, &[tip.clone()], message)
            .await?;
        self.host.update_ref(&branch, &commit).await?;

        metadata.commit_history = self.fetch_history(&branch).await?;
        if !metadata.knows(&commit) {
            metadata.commit_history.push(commit.clone());
        }
        metadata.disconnected = false;
        metadata.last_synced_at = Some(chrono::Utc::now());
        self.store.put(&self.session_id, &metadata).await?;

        info!(
            "Pushed {} files to {}@{} as {}",
            entries.len(),
            metadata.remote_url,
            branch,
            commit
        );
        Ok(PushOutcome {
            commit_sha: commit,
            files_pushed: entries.len(),
            files_ignored,
        })
    }

    async fn upload_blob(&self, content: &[u8]) -> Result<String> {
        let local = blob_sha(content);
        if let Some(remote) = self.uploaded.lock().await.get(&local) {
            return Ok(remote.clone());
        }
        let remote = self.host.create_blob(content).await?;
        self.uploaded.lock().await.insert(local, remote.clone());
        Ok(remote)
    }

    /// Check the remote tip once; `None` when nothing new was committed
    pub async fn poll_once(&self) -> Result<Option<RemoteUpdate>> {
        let _guard = self.op_lock.lock().await;
        let metadata = self.connected_metadata().await?;
        let result = self.poll_tip(metadata.clone()).await;
        self.note_gone(metadata, result).await
    }

    async fn poll_tip(&self, mut metadata: GitMetadata) -> Result<Option<RemoteUpdate>> {
        let tip = self.host.get_ref(&metadata.branch).await?;
        if metadata.last_known_sha() == Some(tip.as_str()) || metadata.knows(&tip) {
            return Ok(None);
        }

        let commit = self.host.get_commit(&tip).await?;
        let mut update = RemoteUpdate {
            sha: tip.clone(),
            message: commit.message.clone(),
            ..Default::default()
        };

        for file in &commit.files {
            match file.status {
                ChangeStatus::Removed => update.removed.push(file.path.clone()),
                ChangeStatus::Added | ChangeStatus::Renamed => {
                    if let Some(previous) = &file.previous_path {
                        update.removed.push(previous.clone());
                    }
                    match self.host.get_content(&file.path, &tip).await? {
                        Some(content) => update.added.push((file.path.clone(), content)),
                        None => debug!("Skipping binary remote file {}", file.path),
                    }
                }
                ChangeStatus::Modified => match self.host.get_content(&file.path, &tip).await? {
                    Some(content) => update.changed.push((file.path.clone(), content)),
                    None => debug!("Skipping binary remote file {}", file.path),
                },
            }
        }

        for sha in self.fetch_history(&metadata.branch).await? {
            if !metadata.knows(&sha) {
                metadata.commit_history.push(sha);
            }
        }
        if !metadata.knows(&tip) {
            metadata.commit_history.push(tip.clone());
        }
        metadata.last_synced_at = Some(chrono::Utc::now());
        self.store.put(&self.session_id, &metadata).await?;

        info!(
            "Remote commit {} on {}: {} added, {} changed, {} removed",
            tip,
            metadata.branch,
            update.added.len(),
            update.changed.len(),
            update.removed.len()
        );
        Ok(Some(update))
    }

    /// Poll on a fixed interval until cancelled, forwarding updates
    ///
    /// Failures are logged and the loop keeps going.
    pub fn spawn_polling(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
        updates: mpsc::UnboundedSender<RemoteUpdate>,
    ) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match sync.poll_once().await {
                    Ok(Some(update)) => {
                        if updates.send(update).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(WorkbenchError::NotConnected) => {}
                    Err(e) => warn!("Git poll for session {} failed: {}", sync.session_id, e),
                }
            }
            debug!("Git polling stopped for session {}", sync.session_id);
        })
    }

    async fn connected_metadata(&self) -> Result<GitMetadata> {
        let metadata = self
            .store
            .get(&self.session_id)
            .await?
            .ok_or(WorkbenchError::NotConnected)?;
        if metadata.disconnected {
            return Err(WorkbenchError::Disconnected(metadata.remote_url));
        }
        Ok(metadata)
    }

    /// Commits of `branch`, oldest first
    async fn fetch_history(&self, branch: &str) -> Result<Vec<String>> {
        let mut commits = self.host.list_commits(branch).await?;
        commits.reverse();
        Ok(commits)
    }

    /// A vanished repository drops the stale history and blocks sync until reconnect
    async fn note_gone<T>(&self, mut metadata: GitMetadata, result: Result<T>) -> Result<T> {
        if let Err(WorkbenchError::RepositoryGone(repo)) = &result {
            warn!(
                "Repository {} is gone; session {} marked disconnected",
                repo, self.session_id
            );
            metadata.disconnected = true;
            metadata.commit_history.clear();
            metadata.last_synced_at = None;
            self.uploaded.lock().await.clear();
            self.store.put(&self.session_id, &metadata).await?;
        }
        result
    }
}

/// Git blob object id of `content`
pub fn blob_sha(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_sha_matches_git() {
        // `printf 'hello world' | git hash-object --stdin`
        assert_eq!(
            blob_sha(b"hello world"),
            "95d09f2b10159347eece71399a7e2e907ea3df4f"
        );
        assert_eq!(blob_sha(b""), "e69de29bb2d1d6ba2f49eacea3c6bc08a3f7ac24");
    }
}
