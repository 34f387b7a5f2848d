//! Per-session façade over the whole engine
//!
//! Owns the artifacts and their runners, the global execution queue, the
//! streaming sampler and the lazily booted sandbox, and wires the file store,
//! editor, terminals, previews and git sync together. Every sandbox mutation
//! goes through the queue.

use crate::config::WorkbenchConfig;
use crate::editor::EditorDocumentStore;
use crate::error::{Result, WorkbenchError};
use crate::errors::{fix_errors_message, CodeErrorQueue};
use crate::export;
use crate::files::FileStore;
use crate::ports::{
    DeployConfig, DeployProgress, DeploymentProvider, DeploymentResult, Sandbox, SandboxBooter,
    ShellSource, TerminalBackend,
};
use crate::preview::PreviewManager;
use crate::queue::{ExecutionQueue, QueueTicket};
use crate::runner::{ActionOutcome, ActionRunner};
use crate::sampler::Sampler;
use crate::sync::VersionControlSync;
use crate::terminal::{TerminalId, TerminalManager};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use workbench_types::{
    Action, ActionKey, ActionRecord, ActionState, ArtifactKind, ArtifactPatch, ArtifactSummary,
    CodeError, ErrorSource, PushOutcome, RemoteUpdate,
};

/// What `enqueue_action` did with an action
pub enum Enqueued {
    /// `should_execute` was false
    Dropped,
    /// Handed to the streaming sampler
    Sampled,
    /// Appended to the execution queue
    Queued(QueueTicket<Result<ActionOutcome>>),
}

struct Artifact {
    id: String,
    title: String,
    kind: ArtifactKind,
    closed: bool,
    runner: Arc<ActionRunner>,
}

struct Inner {
    config: WorkbenchConfig,
    files: Arc<FileStore>,
    editor: Arc<EditorDocumentStore>,
    terminals: Arc<TerminalManager>,
    shells: Arc<dyn ShellSource>,
    errors: Arc<CodeErrorQueue>,
    preview: Arc<PreviewManager>,
    queue: ExecutionQueue,
    sampler: Sampler<ActionKey, ActionRecord>,
    artifacts: RwLock<Vec<Artifact>>,
    booter: Arc<dyn SandboxBooter>,
    sandbox: OnceCell<Arc<dyn Sandbox>>,
    deferred: Mutex<Vec<ActionRecord>>,
    /// Fresh work was queued since the deferred actions were last retried
    retry_armed: AtomicBool,
    git: RwLock<Option<Arc<VersionControlSync>>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct WorkbenchOrchestrator {
    inner: Arc<Inner>,
}

impl WorkbenchOrchestrator {
    /// Runner shell actions dispatch to the terminal manager's runner session
    pub fn new(
        config: WorkbenchConfig,
        booter: Arc<dyn SandboxBooter>,
        backend: Arc<dyn TerminalBackend>,
    ) -> Self {
        let terminals = Arc::new(Self::terminal_manager(&config, backend));
        let shells: Arc<dyn ShellSource> = terminals.clone();
        Self::build(config, booter, terminals, shells)
    }

    /// Runner shell actions dispatch to `shells` instead of the terminal manager
    pub fn with_shell_source(
        config: WorkbenchConfig,
        booter: Arc<dyn SandboxBooter>,
        backend: Arc<dyn TerminalBackend>,
        shells: Arc<dyn ShellSource>,
    ) -> Self {
        let terminals = Arc::new(Self::terminal_manager(&config, backend));
        Self::build(config, booter, terminals, shells)
    }

    fn terminal_manager(config: &WorkbenchConfig, backend: Arc<dyn TerminalBackend>) -> TerminalManager {
        TerminalManager::new(
            backend,
            config.shell.clone(),
            config.work_dir.clone(),
            config.terminal_cols,
            config.terminal_rows,
        )
    }

    fn build(
        config: WorkbenchConfig,
        booter: Arc<dyn SandboxBooter>,
        terminals: Arc<TerminalManager>,
        shells: Arc<dyn ShellSource>,
    ) -> Self {
        let files = Arc::new(FileStore::new(config.work_dir.clone()));
        let editor = Arc::new(EditorDocumentStore::new(files.clone()));
        let errors = Arc::new(CodeErrorQueue::new());
        let preview = Arc::new(PreviewManager::from_config(&config, errors.clone()));

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let sampler_owner = weak.clone();
            let sampler = Sampler::new(
                config.sampler_window(),
                move |_key: ActionKey, record: ActionRecord| {
                    let owner = sampler_owner.clone();
                    async move {
                        if let Some(inner) = owner.upgrade() {
                            inner.apply_sample(record).await;
                        }
                    }
                },
            );

            Inner {
                config,
                files,
                editor,
                terminals,
                shells,
                errors,
                preview,
                queue: ExecutionQueue::new(),
                sampler,
                artifacts: RwLock::new(Vec::new()),
                booter,
                sandbox: OnceCell::new(),
                deferred: Mutex::new(Vec::new()),
                retry_armed: AtomicBool::new(false),
                git: RwLock::new(None),
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }
        });

        let tasks = vec![
            Self::spawn_editor_sync(&inner),
            Self::spawn_drain_watcher(&inner),
        ];
        if let Ok(mut slot) = inner.tasks.try_lock() {
            slot.extend(tasks);
        }

        Self { inner }
    }

    fn spawn_editor_sync(inner: &Arc<Inner>) -> JoinHandle<()> {
        let mut changes = inner.files.subscribe();
        let editor = inner.editor.clone();
        let cancel = inner.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(change) => editor.apply_change(&change).await,
                        Err(broadcast::error::RecvError::Lagged(_)) => editor.sync_from_files().await,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    fn spawn_drain_watcher(inner: &Arc<Inner>) -> JoinHandle<()> {
        let mut pending = inner.queue.watch_pending();
        let owner = Arc::downgrade(inner);
        let cancel = inner.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = pending.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                if *pending.borrow_and_update() != 0 {
                    continue;
                }
                let Some(inner) = owner.upgrade() else {
                    break;
                };
                if inner.retry_armed.swap(false, Ordering::SeqCst) {
                    inner.retry_deferred().await;
                }
            }
        })
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.inner.config
    }

    pub fn files(&self) -> &Arc<FileStore> {
        &self.inner.files
    }

    pub fn editor(&self) -> &Arc<EditorDocumentStore> {
        &self.inner.editor
    }

    pub fn terminals(&self) -> &Arc<TerminalManager> {
        &self.inner.terminals
    }

    pub fn preview(&self) -> &Arc<PreviewManager> {
        &self.inner.preview
    }

    pub fn errors(&self) -> &Arc<CodeErrorQueue> {
        &self.inner.errors
    }

    /// Boot the sandbox once; concurrent callers share the same boot
    pub async fn initialize(&self) -> Result<Arc<dyn Sandbox>> {
        self.inner.initialize().await
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.sandbox.initialized()
    }

    /// Register an artifact; false if it already exists
    pub async fn register_artifact(&self, id: &str, title: &str, kind: ArtifactKind) -> bool {
        let mut artifacts = self.inner.artifacts.write().await;
        if artifacts.iter().any(|a| a.id == id) {
            return false;
        }
        let runner = Arc::new(ActionRunner::new(
            id,
            self.inner.files.clone(),
            self.inner.shells.clone(),
            self.inner.config.shell_timeout(),
        ));
        artifacts.push(Artifact {
            id: id.to_string(),
            title: title.to_string(),
            kind,
            closed: false,
            runner,
        });
        info!("Registered artifact {} ({})", id, title);
        true
    }

    /// Merge title/closed into an artifact; false if it is unknown
    pub async fn update_artifact(&self, id: &str, patch: ArtifactPatch) -> bool {
        let mut artifacts = self.inner.artifacts.write().await;
        let Some(artifact) = artifacts.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        if let Some(title) = patch.title {
            artifact.title = title;
        }
        if let Some(closed) = patch.closed {
            artifact.closed = closed;
        }
        true
    }

    /// Artifacts in registration order
    pub async fn artifacts(&self) -> Vec<ArtifactSummary> {
        let artifacts = self.inner.artifacts.read().await;
        let mut summaries = Vec::with_capacity(artifacts.len());
        for artifact in artifacts.iter() {
            summaries.push(ArtifactSummary {
                id: artifact.id.clone(),
                title: artifact.title.clone(),
                kind: artifact.kind,
                closed: artifact.closed,
                actions: artifact.runner.actions().await,
            });
        }
        summaries
    }

    pub async fn artifact_actions(&self, id: &str) -> Option<Vec<ActionState>> {
        let runner = self.inner.runner(id).await?;
        Some(runner.actions().await)
    }

    /// Route an action from the AI stream
    ///
    /// Streaming deliveries go through the sampler and only touch memory; the
    /// final delivery is queued behind everything enqueued before it.
    ///
    /// # Panics
    ///
    /// If the action's artifact was never registered.
    pub async fn enqueue_action(&self, record: ActionRecord, streaming: bool) -> Result<Enqueued> {
        if !record.should_execute {
            debug!("Dropping {} (should_execute = false)", record.key());
            return Ok(Enqueued::Dropped);
        }

        let Some(runner) = self.inner.runner(&record.artifact_id).await else {
            unreachable!(
                "action {} delivered for unregistered artifact {}",
                record.action_id, record.artifact_id
            );
        };

        if streaming {
            runner.add_action(&record).await;
            self.inner.sampler.call(record.key(), record);
            return Ok(Enqueued::Sampled);
        }

        self.inner.sampler.cancel(&record.key());
        self.inner.retry_armed.store(true, Ordering::SeqCst);
        let ticket = self.inner.enqueue_execution(runner, record)?;
        Ok(Enqueued::Queued(ticket))
    }

    /// Resolve once the execution queue is empty
    pub async fn wait_idle(&self) {
        self.inner.queue.wait_idle().await;
    }

    /// Shell actions parked until a runner shell shows up
    pub async fn deferred_actions(&self) -> Vec<ActionKey> {
        self.inner
            .deferred
            .lock()
            .await
            .iter()
            .map(ActionRecord::key)
            .collect()
    }

    /// Re-enqueue every deferred action, returning how many were retried
    pub async fn retry_deferred(&self) -> usize {
        self.inner.retry_deferred().await
    }

    /// Spawn an interactive terminal session
    pub async fn attach_terminal(&self) -> Result<TerminalId> {
        self.inner.terminals.attach().await
    }

    /// Spawn the session shell actions run in, then retry deferred actions
    pub async fn attach_runner_shell(&self) -> Result<TerminalId> {
        let id = self.inner.terminals.attach_runner_shell().await?;
        self.inner.retry_deferred().await;
        Ok(id)
    }

    pub async fn push_code_error(&self, error: CodeError) -> bool {
        self.inner.errors.push(error).await
    }

    pub async fn code_errors(&self) -> Vec<CodeError> {
        self.inner.errors.list().await
    }

    /// User dismissed the pending errors
    pub async fn clear_code_errors(&self) {
        self.inner.errors.clear().await;
        self.inner.preview.dismiss_errors().await;
    }

    /// Take the pending errors as a fix request; `None` if there is nothing to fix
    pub async fn request_fix(&self) -> Option<String> {
        let errors = self.inner.errors.take().await;
        let message = fix_errors_message(&errors)?;
        self.inner.preview.start_fixing().await;
        Some(message)
    }

    /// Persist an editor document's live content to the store and the sandbox
    pub async fn save_file(&self, path: &str) -> Result<bool> {
        let Some(content) = self.inner.editor.pending_save(path).await? else {
            return Ok(false);
        };
        let inner = self.inner.clone();
        let path = path.to_string();
        self.inner
            .queue
            .push(async move {
                let sandbox = inner.initialize().await?;
                inner
                    .files
                    .write_through(sandbox.as_ref(), &path, &content)
                    .await?;
                inner.editor.mark_saved(&path).await
            })?
            .wait()
            .await??;
        Ok(true)
    }

    /// Zip of the current non-binary tree with the `.env` shim applied
    pub async fn download_archive(&self) -> Result<Vec<u8>> {
        export::build_archive(&self.inner.files, &self.inner.config.export).await
    }

    pub async fn sync_to_local(&self, target: &Path) -> Result<usize> {
        export::sync_to_directory(&self.inner.files, target).await
    }

    /// Archive the project and hand it to a deployment provider
    pub async fn deploy(
        &self,
        provider: &dyn DeploymentProvider,
        config: &DeployConfig,
        progress: &(dyn Fn(DeployProgress) + Send + Sync),
    ) -> Result<DeploymentResult> {
        progress(DeployProgress::Packaging);
        let archive = self.download_archive().await?;
        info!(
            "Deploying {} ({} bytes) with {}",
            config.project_name,
            archive.len(),
            provider.name()
        );
        let result = provider.deploy(&archive, config, progress).await?;
        info!("Deployed {} to {}", config.project_name, result.url);
        Ok(result)
    }

    /// Use `sync` for pushes and start polling it for remote commits
    pub async fn connect_git(&self, sync: Arc<VersionControlSync>) {
        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel::<RemoteUpdate>();
        let poller = sync.spawn_polling(
            self.inner.config.git_poll_interval(),
            self.inner.cancel.child_token(),
            updates_tx,
        );

        let owner = Arc::downgrade(&self.inner);
        let merger = tokio::spawn(async move {
            while let Some(update) = updates_rx.recv().await {
                let Some(inner) = owner.upgrade() else {
                    break;
                };
                if let Err(e) = inner.merge_remote_update(update).await {
                    error!("Failed to merge remote update: {}", e);
                }
            }
        });

        *self.inner.git.write().await = Some(sync);
        self.inner.tasks.lock().await.extend([poller, merger]);
    }

    pub async fn git(&self) -> Option<Arc<VersionControlSync>> {
        self.inner.git.read().await.clone()
    }

    /// Push the tree once everything queued before has been applied
    pub async fn push_to_git(&self, message: &str) -> Result<PushOutcome> {
        let sync = self.git().await.ok_or(WorkbenchError::NotConnected)?;
        let message = message.to_string();
        self.inner
            .queue
            .push(async move { sync.push(&message).await })?
            .wait()
            .await?
    }

    /// Apply a remote commit to the tree through the queue
    pub async fn merge_remote_update(&self, update: RemoteUpdate) -> Result<()> {
        self.inner.merge_remote_update(update).await
    }

    /// Stop background loops, drain the queue and kill terminal sessions
    pub async fn dispose(&self) {
        info!("Disposing workbench session");
        self.inner.cancel.cancel();
        self.inner.sampler.cancel_all();
        self.inner.queue.shutdown().await;
        self.inner.terminals.kill_all().await;

        let tasks = std::mem::take(&mut *self.inner.tasks.lock().await);
        for task in tasks {
            task.abort();
        }
    }
}

impl Inner {
    async fn initialize(&self) -> Result<Arc<dyn Sandbox>> {
        let sandbox = self
            .sandbox
            .get_or_try_init(|| async {
                info!("Booting sandbox");
                let sandbox = self.booter.boot().await.map_err(|e| {
                    error!("Sandbox boot failed: {}", e);
                    e
                })?;
                let events = sandbox.subscribe();
                let handle = self.preview.spawn(events, self.cancel.child_token());
                self.tasks.lock().await.push(handle);
                info!("Sandbox ready at {}", sandbox.work_dir());
                Ok::<_, WorkbenchError>(sandbox)
            })
            .await?;
        Ok(sandbox.clone())
    }

    async fn runner(&self, artifact_id: &str) -> Option<Arc<ActionRunner>> {
        self.artifacts
            .read()
            .await
            .iter()
            .find(|a| a.id == artifact_id)
            .map(|a| a.runner.clone())
    }

    fn enqueue_execution(
        self: &Arc<Self>,
        runner: Arc<ActionRunner>,
        record: ActionRecord,
    ) -> Result<QueueTicket<Result<ActionOutcome>>> {
        let inner = Arc::clone(self);
        self.queue.push(async move { inner.execute(runner, record).await })
    }

    async fn execute(&self, runner: Arc<ActionRunner>, record: ActionRecord) -> Result<ActionOutcome> {
        let sandbox = self.initialize().await?;
        match runner.run_action(&record, sandbox.as_ref()).await {
            Err(e) if e.is_not_ready() => {
                debug!("No runner shell for {}; deferring", record.key());
                let mut deferred = self.deferred.lock().await;
                if !deferred.iter().any(|r| r.key() == record.key()) {
                    deferred.push(record);
                }
                Err(e)
            }
            Ok(ActionOutcome::Failed { exit_code, output }) => {
                if let Action::Shell { command } = &record.action {
                    self.errors
                        .push(shell_error(command, exit_code, &output))
                        .await;
                }
                Ok(ActionOutcome::Failed { exit_code, output })
            }
            other => other,
        }
    }

    async fn apply_sample(&self, record: ActionRecord) {
        let Some(runner) = self.runner(&record.artifact_id).await else {
            return;
        };
        if let Err(e) = runner.apply_streaming(&record).await {
            warn!("Streaming update for {} failed: {}", record.key(), e);
        }
    }

    async fn retry_deferred(self: &Arc<Self>) -> usize {
        let records = std::mem::take(&mut *self.deferred.lock().await);
        let mut retried = 0;
        for record in records {
            let Some(runner) = self.runner(&record.artifact_id).await else {
                continue;
            };
            match self.enqueue_execution(runner, record) {
                Ok(_) => retried += 1,
                Err(e) => {
                    warn!("Could not re-enqueue deferred action: {}", e);
                    break;
                }
            }
        }
        if retried > 0 {
            info!("Retrying {} deferred actions", retried);
        }
        retried
    }

    async fn merge_remote_update(self: &Arc<Self>, update: RemoteUpdate) -> Result<()> {
        let inner = Arc::clone(self);
        self.queue
            .push(async move {
                let sandbox = inner.initialize().await?;
                for path in &update.removed {
                    if inner.files.get(path).await.is_some() {
                        inner.files.remove_through(sandbox.as_ref(), path).await?;
                    }
                }
                for (path, content) in update.added.iter().chain(&update.changed) {
                    inner
                        .files
                        .write_through(sandbox.as_ref(), path, content)
                        .await?;
                }
                info!("Merged remote commit {}", update.sha);
                Ok(())
            })?
            .wait()
            .await?
    }
}

fn shell_error(command: &str, exit_code: Option<i32>, output: &str) -> CodeError {
    let description = match exit_code {
        Some(code) => format!("`{}` exited with code {}", command, code),
        None => format!("`{}` did not complete", command),
    };
    let content = if output.trim().is_empty() {
        description.clone()
    } else {
        output.to_string()
    };
    CodeError::new("Command Failed", description, content, ErrorSource::Terminal)
}
