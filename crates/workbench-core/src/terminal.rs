//! Terminal manager - interactive shell sessions inside the sandbox
//!
//! Owns a small set of PTY sessions:
//! - attach/detach sessions, a failed spawn never touches existing ones
//! - resize propagates to every live session
//! - one session may be designated the runner shell used by action runners

use crate::error::{Result, WorkbenchError};
use crate::ports::{CommandOutput, CommandShell, ShellSource, TerminalBackend, TerminalSession};
use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Poll interval while waiting for command output
const READ_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TerminalId(pub u32);

impl std::fmt::Display for TerminalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "term-{}", self.0)
    }
}

/// Terminal summary for front ends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalInfo {
    pub id: TerminalId,
    pub pid: u32,
    pub alive: bool,
    pub runner: bool,
}

type SharedSession = Arc<dyn TerminalSession>;

pub struct TerminalManager {
    backend: Arc<dyn TerminalBackend>,
    shell: String,
    cwd: String,
    env: HashMap<String, String>,
    size: RwLock<(u16, u16)>,
    sessions: RwLock<BTreeMap<TerminalId, SharedSession>>,
    runner: RwLock<Option<(TerminalId, Arc<RunnerShell>)>>,
    next_id: AtomicU32,
}

impl TerminalManager {
    pub fn new(
        backend: Arc<dyn TerminalBackend>,
        shell: impl Into<String>,
        cwd: impl Into<String>,
        cols: u16,
        rows: u16,
    ) -> Self {
        let env = HashMap::from([("TERM".to_string(), "xterm-256color".to_string())]);
        Self {
            backend,
            shell: shell.into(),
            cwd: cwd.into(),
            env,
            size: RwLock::new((cols, rows)),
            sessions: RwLock::new(BTreeMap::new()),
            runner: RwLock::new(None),
            next_id: AtomicU32::new(1),
        }
    }

    /// Spawn a new interactive session
    pub async fn attach(&self) -> Result<TerminalId> {
        let (cols, rows) = *self.size.read().await;
        let session = match self
            .backend
            .spawn(&self.shell, &self.cwd, &self.env, cols, rows)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to spawn terminal session: {}", e);
                return Err(e);
            }
        };

        let id = TerminalId(self.next_id.fetch_add(1, Ordering::Relaxed));
        info!("Attached terminal {} (pid {})", id, session.pid());
        self.sessions
            .write()
            .await
            .insert(id, Arc::from(session));
        Ok(id)
    }

    /// Spawn a session and make it the runner shell
    pub async fn attach_runner_shell(&self) -> Result<TerminalId> {
        let id = self.attach().await?;
        let session = self
            .session(id)
            .await
            .ok_or_else(|| WorkbenchError::Terminal(format!("{} vanished", id)))?;
        *self.runner.write().await = Some((id, Arc::new(RunnerShell::new(session))));
        info!("Terminal {} is now the runner shell", id);
        Ok(id)
    }

    pub async fn runner_id(&self) -> Option<TerminalId> {
        self.runner.read().await.as_ref().map(|(id, _)| *id)
    }

    pub async fn detach(&self, id: TerminalId) -> Result<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| WorkbenchError::Terminal(format!("Unknown terminal {}", id)))?;

        {
            let mut runner = self.runner.write().await;
            if runner.as_ref().is_some_and(|(runner_id, _)| *runner_id == id) {
                *runner = None;
            }
        }

        if session.is_alive() {
            session.kill().await?;
        }
        info!("Detached terminal {}", id);
        Ok(())
    }

    /// Resize every live session
    pub async fn resize(&self, cols: u16, rows: u16) {
        *self.size.write().await = (cols, rows);
        let sessions: Vec<(TerminalId, SharedSession)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect();

        for (id, session) in sessions {
            if !session.is_alive() {
                continue;
            }
            if let Err(e) = session.resize(cols, rows).await {
                warn!("Failed to resize terminal {}: {}", id, e);
            }
        }
        debug!("Resized terminals to {}x{}", cols, rows);
    }

    pub async fn size(&self) -> (u16, u16) {
        *self.size.read().await
    }

    pub async fn write(&self, id: TerminalId, data: &[u8]) -> Result<()> {
        let session = self
            .session(id)
            .await
            .ok_or_else(|| WorkbenchError::Terminal(format!("Unknown terminal {}", id)))?;
        session.write(data).await
    }

    pub async fn read(&self, id: TerminalId) -> Result<Option<Bytes>> {
        let session = self
            .session(id)
            .await
            .ok_or_else(|| WorkbenchError::Terminal(format!("Unknown terminal {}", id)))?;
        session.read().await
    }

    pub async fn list(&self) -> Vec<TerminalInfo> {
        let runner = self.runner_id().await;
        let mut infos = Vec::new();
        for (id, session) in self.sessions.read().await.iter() {
            infos.push(TerminalInfo {
                id: *id,
                pid: session.pid(),
                alive: session.is_alive(),
                runner: runner == Some(*id),
            });
        }
        infos
    }

    /// Kill every session (session end)
    pub async fn kill_all(&self) {
        *self.runner.write().await = None;
        let sessions: Vec<(TerminalId, SharedSession)> =
            std::mem::take(&mut *self.sessions.write().await)
                .into_iter()
                .collect();
        for (id, session) in sessions {
            if session.is_alive() {
                if let Err(e) = session.kill().await {
                    warn!("Failed to kill terminal {}: {}", id, e);
                }
            }
        }
    }

    async fn session(&self, id: TerminalId) -> Option<SharedSession> {
        self.sessions.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl ShellSource for TerminalManager {
    async fn select_shell(&self) -> Option<Arc<dyn CommandShell>> {
        let runner = self.runner.read().await;
        let (_, shell) = runner.as_ref()?;
        if !shell.session.is_alive() {
            return None;
        }
        Some(shell.clone() as Arc<dyn CommandShell>)
    }
}

/// Runs commands to completion on an interactive session
///
/// Each command is followed by a `printf` of its exit status wrapped in a
/// per-command nonce; output is collected until that marker shows up.
/// Commands are serialized on their own lock; the session itself stays
/// available for resizes and listing while one runs.
pub struct RunnerShell {
    session: SharedSession,
    running: Mutex<()>,
    counter: AtomicU32,
}

impl RunnerShell {
    fn new(session: SharedSession) -> Self {
        Self {
            session,
            running: Mutex::new(()),
            counter: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CommandShell for RunnerShell {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        let nonce = self.counter.fetch_add(1, Ordering::Relaxed);
        let marker = Regex::new(&format!(r"__WB_EXIT_(\d+)_{}__", nonce))
            .map_err(|e| WorkbenchError::Terminal(e.to_string()))?;

        let _running = self.running.lock().await;
        let session = &self.session;

        // Drop output left over from earlier interactive use
        while session.read().await?.is_some() {}

        let script = format!(
            "{}\nprintf '\\n__WB_EXIT_%s_{}__\\n' \"$?\"\n",
            command.trim_end(),
            nonce
        );
        session.write(script.as_bytes()).await?;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut output = String::new();
        loop {
            match session.read().await? {
                Some(chunk) => {
                    output.push_str(&String::from_utf8_lossy(&chunk));
                    if let Some(caps) = marker.captures(&output) {
                        let exit_code = caps[1].parse().unwrap_or(-1);
                        let end = caps.get(0).map(|m| m.start()).unwrap_or(output.len());
                        output.truncate(end);
                        return Ok(CommandOutput {
                            output: output.trim_end().to_string(),
                            exit_code,
                        });
                    }
                }
                None => {
                    if !session.is_alive() {
                        return Err(WorkbenchError::Terminal(format!(
                            "Runner shell exited with {:?} while running `{}`",
                            session.exit_code(),
                            command
                        )));
                    }
                    if tokio::time::Instant::now() >= deadline {
                        // Interrupt so the shell is usable for the next command
                        if let Err(e) = session.write(&[0x03]).await {
                            warn!("Failed to interrupt timed out command `{}`: {}", command, e);
                        }
                        return Err(WorkbenchError::CommandTimeout {
                            command: command.to_string(),
                            seconds: timeout.as_secs(),
                        });
                    }
                    tokio::time::sleep(READ_POLL).await;
                }
            }
        }
    }
}
