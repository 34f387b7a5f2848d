//! Per-artifact action runner
//!
//! Tracks every action of one artifact through `Pending -> Running ->
//! Complete | Failed`. A file action touches the in-memory tree on every
//! delivery but only reaches the sandbox on its final delivery; a shell action
//! runs in whatever shell the shell source hands out. Once an action has
//! executed, further deliveries of it are ignored.

use crate::error::{Result, WorkbenchError};
use crate::files::FileStore;
use crate::ports::{Sandbox, ShellSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use workbench_types::{Action, ActionRecord, ActionState, ActionStatus};

/// What delivering an action did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Streaming delivery applied to memory only
    Streamed,
    Executed,
    /// Redelivery of an action that already ran
    AlreadyExecuted,
    Failed {
        exit_code: Option<i32>,
        output: String,
    },
}

pub struct ActionRunner {
    artifact_id: String,
    files: Arc<FileStore>,
    shells: Arc<dyn ShellSource>,
    shell_timeout: Duration,
    actions: RwLock<Vec<ActionState>>,
}

impl ActionRunner {
    pub fn new(
        artifact_id: impl Into<String>,
        files: Arc<FileStore>,
        shells: Arc<dyn ShellSource>,
        shell_timeout: Duration,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            files,
            shells,
            shell_timeout,
            actions: RwLock::new(Vec::new()),
        }
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    /// Track an action, refreshing its payload while it is still pending
    pub async fn add_action(&self, record: &ActionRecord) {
        let mut actions = self.actions.write().await;
        match actions.iter_mut().find(|a| a.action_id == record.action_id) {
            Some(state) if matches!(state.status, ActionStatus::Pending) => {
                state.action = record.action.clone();
            }
            Some(_) => {}
            None => actions.push(ActionState {
                action_id: record.action_id.clone(),
                action: record.action.clone(),
                status: ActionStatus::Pending,
            }),
        }
    }

    /// Streaming delivery: update the file tree in memory, nothing else
    pub async fn apply_streaming(&self, record: &ActionRecord) -> Result<ActionOutcome> {
        self.add_action(record).await;
        if self.is_executed(&record.action_id).await {
            return Ok(ActionOutcome::AlreadyExecuted);
        }

        if let Action::File { file_path, content } = &record.action {
            self.files.set_content(file_path, content.as_str()).await?;
        }
        Ok(ActionOutcome::Streamed)
    }

    /// Final delivery: execute against the sandbox
    ///
    /// Fails with `RunnerNotReady` when a shell action finds no shell; the
    /// action stays pending so it can be retried.
    pub async fn run_action(
        &self,
        record: &ActionRecord,
        sandbox: &dyn Sandbox,
    ) -> Result<ActionOutcome> {
        self.add_action(record).await;
        if !self.begin(&record.action_id).await {
            debug!(
                "Skipping {}/{}: already executed",
                self.artifact_id, record.action_id
            );
            return Ok(ActionOutcome::AlreadyExecuted);
        }

        let result = match &record.action {
            Action::File { file_path, content } => self
                .files
                .write_through(sandbox, file_path, content)
                .await
                .map(|_| ActionOutcome::Executed),
            Action::Shell { command } => self.run_shell(command).await,
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_not_ready() => {
                self.set_status(&record.action_id, ActionStatus::Pending).await;
                return Err(e);
            }
            Err(e) => ActionOutcome::Failed {
                exit_code: None,
                output: e.to_string(),
            },
        };

        let status = match &outcome {
            ActionOutcome::Failed { exit_code, output } => {
                warn!(
                    "Action {}/{} failed ({}): exit code {:?}",
                    self.artifact_id,
                    record.action_id,
                    record.action.label(),
                    exit_code
                );
                ActionStatus::Failed {
                    error: output.clone(),
                }
            }
            _ => {
                info!(
                    "Action {}/{} complete: {}",
                    self.artifact_id,
                    record.action_id,
                    record.action.label()
                );
                ActionStatus::Complete
            }
        };
        self.set_status(&record.action_id, status).await;
        Ok(outcome)
    }

    async fn run_shell(&self, command: &str) -> Result<ActionOutcome> {
        let shell = self
            .shells
            .select_shell()
            .await
            .ok_or(WorkbenchError::RunnerNotReady)?;

        let output = shell.execute(command, self.shell_timeout).await?;
        if output.exit_code == 0 {
            Ok(ActionOutcome::Executed)
        } else {
            Ok(ActionOutcome::Failed {
                exit_code: Some(output.exit_code),
                output: output.output,
            })
        }
    }

    /// Move a pending action to running; false if it already ran or is running
    async fn begin(&self, action_id: &str) -> bool {
        let mut actions = self.actions.write().await;
        match actions.iter_mut().find(|a| a.action_id == action_id) {
            Some(state) if matches!(state.status, ActionStatus::Pending) => {
                state.status = ActionStatus::Running;
                true
            }
            _ => false,
        }
    }

    async fn set_status(&self, action_id: &str, status: ActionStatus) {
        let mut actions = self.actions.write().await;
        if let Some(state) = actions.iter_mut().find(|a| a.action_id == action_id) {
            state.status = status;
        }
    }

    pub async fn is_executed(&self, action_id: &str) -> bool {
        self.actions
            .read()
            .await
            .iter()
            .any(|a| a.action_id == action_id && a.status.is_executed())
    }

    pub async fn status(&self, action_id: &str) -> Option<ActionStatus> {
        self.actions
            .read()
            .await
            .iter()
            .find(|a| a.action_id == action_id)
            .map(|a| a.status.clone())
    }

    /// Actions in arrival order
    pub async fn actions(&self) -> Vec<ActionState> {
        self.actions.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{CommandOutput, CommandShell};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::broadcast;
    use workbench_types::{ProcessOutput, SandboxEvent};

    #[derive(Default)]
    struct RecordingSandbox {
        writes: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Sandbox for RecordingSandbox {
        fn work_dir(&self) -> &str {
            "/home/project"
        }

        async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push((path.to_string(), String::from_utf8_lossy(content).to_string()));
            Ok(())
        }

        async fn mkdir(&self, _path: &str) -> Result<()> {
            Ok(())
        }

        async fn remove(&self, _path: &str) -> Result<()> {
            Ok(())
        }

        async fn spawn(&self, _: &str, _: &[String], _: Duration) -> Result<ProcessOutput> {
            Ok(ProcessOutput::default())
        }

        fn subscribe(&self) -> broadcast::Receiver<SandboxEvent> {
            broadcast::channel(1).1
        }
    }

    struct FixedShell(i32);

    #[async_trait]
    impl CommandShell for FixedShell {
        async fn execute(&self, command: &str, _timeout: Duration) -> Result<CommandOutput> {
            Ok(CommandOutput {
                output: format!("ran {}", command),
                exit_code: self.0,
            })
        }
    }

    struct Shells(Option<Arc<dyn CommandShell>>);

    #[async_trait]
    impl ShellSource for Shells {
        async fn select_shell(&self) -> Option<Arc<dyn CommandShell>> {
            self.0.clone()
        }
    }

    fn runner(shell: Option<i32>) -> (ActionRunner, Arc<FileStore>) {
        let files = Arc::new(FileStore::new("/home/project"));
        let shell = shell.map(|code| Arc::new(FixedShell(code)) as Arc<dyn CommandShell>);
        let runner = ActionRunner::new(
            "a1",
            files.clone(),
            Arc::new(Shells(shell)),
            Duration::from_secs(5),
        );
        (runner, files)
    }

    fn file(id: &str, path: &str, content: &str) -> ActionRecord {
        ActionRecord::new(
            "a1",
            id,
            Action::File {
                file_path: path.to_string(),
                content: content.to_string(),
            },
        )
    }

    fn shell(id: &str, command: &str) -> ActionRecord {
        ActionRecord::new(
            "a1",
            id,
            Action::Shell {
                command: command.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_streaming_touches_memory_only() {
        let (runner, files) = runner(None);
        let sandbox = RecordingSandbox::default();

        let outcome = runner
            .apply_streaming(&file("0", "src/App.tsx", "partial"))
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Streamed);
        assert_eq!(files.content("src/App.tsx").await.as_deref(), Some("partial"));
        assert!(sandbox.writes.lock().unwrap().is_empty());

        runner
            .run_action(&file("0", "src/App.tsx", "final"), &sandbox)
            .await
            .unwrap();
        assert_eq!(
            *sandbox.writes.lock().unwrap(),
            vec![("/home/project/src/App.tsx".to_string(), "final".to_string())]
        );
        assert_eq!(runner.status("0").await, Some(ActionStatus::Complete));
    }

    #[tokio::test]
    async fn test_redelivery_is_noop() {
        let (runner, files) = runner(None);
        let sandbox = RecordingSandbox::default();
        let record = file("0", "a.txt", "v1");

        assert_eq!(
            runner.run_action(&record, &sandbox).await.unwrap(),
            ActionOutcome::Executed
        );
        let before = files.snapshot().await;

        assert_eq!(
            runner.run_action(&record, &sandbox).await.unwrap(),
            ActionOutcome::AlreadyExecuted
        );
        assert_eq!(
            runner
                .apply_streaming(&file("0", "a.txt", "stale"))
                .await
                .unwrap(),
            ActionOutcome::AlreadyExecuted
        );
        assert_eq!(files.snapshot().await, before);
        assert_eq!(sandbox.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shell_without_terminal_stays_pending() {
        let (runner, _files) = runner(None);
        let sandbox = RecordingSandbox::default();

        let err = runner
            .run_action(&shell("1", "npm install"), &sandbox)
            .await
            .unwrap_err();
        assert!(err.is_not_ready());
        assert_eq!(runner.status("1").await, Some(ActionStatus::Pending));
    }

    #[tokio::test]
    async fn test_failed_shell_marks_action_failed() {
        let (runner, _files) = runner(Some(2));
        let sandbox = RecordingSandbox::default();

        let outcome = runner
            .run_action(&shell("1", "npm run build"), &sandbox)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ActionOutcome::Failed {
                exit_code: Some(2),
                output: "ran npm run build".to_string()
            }
        );
        assert!(runner.is_executed("1").await);
        assert_eq!(runner.actions().await.len(), 1);
    }
}
