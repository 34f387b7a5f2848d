//! In-memory doubles of the engine's external collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use workbench_core::ports::{
    CommandOutput, CommandShell, GitHost, Sandbox, SandboxBooter, ShellSource, TerminalBackend,
    TerminalSession, TreeEntry,
};
use workbench_core::sync::blob_sha;
use workbench_core::{
    CommitFile, CommitInfo, ProcessOutput, Result, SandboxEvent, WorkbenchConfig, WorkbenchError,
    WorkbenchOrchestrator,
};

// ---------------------------------------------------------------------------
// Sandbox

pub struct FakeSandbox {
    /// (path, content) in write order
    pub writes: Mutex<Vec<(String, String)>>,
    pub removed: Mutex<Vec<String>>,
    /// "start <path>" / "end <path>" around every write
    pub log: Mutex<Vec<String>>,
    slow: Mutex<HashMap<String, Duration>>,
    events: broadcast::Sender<SandboxEvent>,
}

impl FakeSandbox {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            writes: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            slow: Mutex::new(HashMap::new()),
            events,
        })
    }

    /// Make writes to `path` take `delay`
    pub fn slow_down(&self, path: &str, delay: Duration) {
        self.slow.lock().unwrap().insert(path.to_string(), delay);
    }

    pub fn emit(&self, event: SandboxEvent) {
        let _ = self.events.send(event);
    }

    pub fn writes_to(&self, path: &str) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    fn work_dir(&self) -> &str {
        "/home/project"
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        self.log.lock().unwrap().push(format!("start {}", path));
        let delay = self.slow.lock().unwrap().get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.writes.lock().unwrap().push((
            path.to_string(),
            String::from_utf8_lossy(content).to_string(),
        ));
        self.log.lock().unwrap().push(format!("end {}", path));
        Ok(())
    }

    async fn mkdir(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.removed.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn spawn(&self, _: &str, _: &[String], _: Duration) -> Result<ProcessOutput> {
        Ok(ProcessOutput::default())
    }

    fn subscribe(&self) -> broadcast::Receiver<SandboxEvent> {
        self.events.subscribe()
    }
}

pub struct FakeBooter {
    pub sandbox: Arc<FakeSandbox>,
    pub boots: AtomicUsize,
    pub fail_next: AtomicBool,
}

impl FakeBooter {
    pub fn new(sandbox: Arc<FakeSandbox>) -> Arc<Self> {
        Arc::new(Self {
            sandbox,
            boots: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SandboxBooter for FakeBooter {
    async fn boot(&self) -> Result<Arc<dyn Sandbox>> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(WorkbenchError::Sandbox("container failed to start".to_string()));
        }
        Ok(self.sandbox.clone())
    }
}

// ---------------------------------------------------------------------------
// Shell

/// Shell source whose single shell can be switched on and off
pub struct FakeShell {
    pub available: AtomicBool,
    pub commands: Mutex<Vec<String>>,
    exit_codes: Mutex<HashMap<String, i32>>,
}

impl FakeShell {
    pub fn new(available: bool) -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(available),
            commands: Mutex::new(Vec::new()),
            exit_codes: Mutex::new(HashMap::new()),
        })
    }

    pub fn fail_with(&self, command: &str, exit_code: i32) {
        self.exit_codes
            .lock()
            .unwrap()
            .insert(command.to_string(), exit_code);
    }
}

struct FakeCommandShell(Arc<FakeShell>);

#[async_trait]
impl CommandShell for FakeCommandShell {
    async fn execute(&self, command: &str, _timeout: Duration) -> Result<CommandOutput> {
        self.0.commands.lock().unwrap().push(command.to_string());
        let exit_code = self
            .0
            .exit_codes
            .lock()
            .unwrap()
            .get(command)
            .copied()
            .unwrap_or(0);
        Ok(CommandOutput {
            output: if exit_code == 0 {
                String::new()
            } else {
                format!("{}: command failed", command)
            },
            exit_code,
        })
    }
}

pub struct FakeShellSource(pub Arc<FakeShell>);

#[async_trait]
impl ShellSource for FakeShellSource {
    async fn select_shell(&self) -> Option<Arc<dyn CommandShell>> {
        if self.0.available.load(Ordering::SeqCst) {
            Some(Arc::new(FakeCommandShell(self.0.clone())))
        } else {
            None
        }
    }
}

/// Backend without PTY support
pub struct NoPtyBackend;

#[async_trait]
impl TerminalBackend for NoPtyBackend {
    async fn spawn(
        &self,
        _shell: &str,
        _cwd: &str,
        _env: &HashMap<String, String>,
        _cols: u16,
        _rows: u16,
    ) -> Result<Box<dyn TerminalSession>> {
        Err(WorkbenchError::Terminal("no pty available".to_string()))
    }
}

pub struct Harness {
    pub orchestrator: WorkbenchOrchestrator,
    pub sandbox: Arc<FakeSandbox>,
    pub booter: Arc<FakeBooter>,
    pub shell: Arc<FakeShell>,
}

pub fn harness(shell_available: bool) -> Harness {
    let sandbox = FakeSandbox::new();
    let booter = FakeBooter::new(sandbox.clone());
    let shell = FakeShell::new(shell_available);
    let orchestrator = WorkbenchOrchestrator::with_shell_source(
        WorkbenchConfig::default(),
        booter.clone(),
        Arc::new(NoPtyBackend),
        Arc::new(FakeShellSource(shell.clone())),
    );
    Harness {
        orchestrator,
        sandbox,
        booter,
        shell,
    }
}

// ---------------------------------------------------------------------------
// Git host

#[derive(Default)]
struct HostState {
    /// branch -> commits, oldest first
    branches: HashMap<String, Vec<String>>,
    commits: HashMap<String, CommitInfo>,
    trees: HashMap<String, BTreeMap<String, String>>,
    blobs: HashMap<String, Vec<u8>>,
    /// `None` marks binary content
    contents: HashMap<(String, String), Option<String>>,
    counter: usize,
}

pub struct FakeGitHost {
    state: Mutex<HostState>,
    pub gone: AtomicBool,
    pub blob_uploads: AtomicUsize,
}

impl FakeGitHost {
    /// Repository whose `main` branch holds commits A and B
    pub fn new() -> Arc<Self> {
        let mut state = HostState::default();
        state.trees.insert("tree-0".to_string(), BTreeMap::new());
        for (sha, parents) in [("A", vec![]), ("B", vec!["A".to_string()])] {
            state.commits.insert(
                sha.to_string(),
                CommitInfo {
                    sha: sha.to_string(),
                    message: format!("commit {}", sha),
                    tree_sha: "tree-0".to_string(),
                    parents,
                    files: Vec::new(),
                },
            );
        }
        state
            .branches
            .insert("main".to_string(), vec!["A".to_string(), "B".to_string()]);

        Arc::new(Self {
            state: Mutex::new(state),
            gone: AtomicBool::new(false),
            blob_uploads: AtomicUsize::new(0),
        })
    }

    /// Simulate a commit pushed by someone else
    pub fn external_commit(&self, branch: &str, sha: &str, files: Vec<CommitFile>, contents: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        let parent = state.branches[branch].last().cloned();
        state.commits.insert(
            sha.to_string(),
            CommitInfo {
                sha: sha.to_string(),
                message: format!("external {}", sha),
                tree_sha: "tree-0".to_string(),
                parents: parent.into_iter().collect(),
                files,
            },
        );
        for (path, content) in contents {
            state
                .contents
                .insert((sha.to_string(), path.to_string()), Some(content.to_string()));
        }
        state
            .branches
            .get_mut(branch)
            .unwrap()
            .push(sha.to_string());
    }

    /// Mark a file of a commit as binary content
    pub fn binary_content(&self, sha: &str, path: &str) {
        self.state
            .lock()
            .unwrap()
            .contents
            .insert((sha.to_string(), path.to_string()), None);
    }

    pub fn tip(&self, branch: &str) -> Option<String> {
        self.state.lock().unwrap().branches[branch].last().cloned()
    }

    pub fn commit_count(&self, branch: &str) -> usize {
        self.state.lock().unwrap().branches[branch].len()
    }

    /// Paths and contents of the tree at a commit
    pub fn tree_at(&self, sha: &str) -> BTreeMap<String, String> {
        let state = self.state.lock().unwrap();
        let tree = &state.trees[&state.commits[sha].tree_sha];
        tree.iter()
            .map(|(path, blob)| {
                (
                    path.clone(),
                    String::from_utf8_lossy(&state.blobs[blob]).to_string(),
                )
            })
            .collect()
    }

    fn check(&self) -> Result<()> {
        if self.gone.load(Ordering::SeqCst) {
            Err(WorkbenchError::RepositoryGone("octo/app".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GitHost for FakeGitHost {
    async fn get_ref(&self, branch: &str) -> Result<String> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .branches
            .get(branch)
            .and_then(|c| c.last().cloned())
            .ok_or_else(|| WorkbenchError::remote("get_ref", format!("no branch {}", branch)))
    }

    async fn create_blob(&self, content: &[u8]) -> Result<String> {
        self.check()?;
        self.blob_uploads.fetch_add(1, Ordering::SeqCst);
        let sha = blob_sha(content);
        self.state
            .lock()
            .unwrap()
            .blobs
            .insert(sha.clone(), content.to_vec());
        Ok(sha)
    }

    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> Result<String> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let mut tree = state.trees.get(base_tree).cloned().unwrap_or_default();
        for entry in entries {
            tree.insert(entry.path.clone(), entry.sha.clone());
        }
        state.counter += 1;
        let sha = format!("tree-{}", state.counter);
        state.trees.insert(sha.clone(), tree);
        Ok(sha)
    }

    async fn create_commit(&self, tree: &str, parents: &[String], message: &str) -> Result<String> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.counter += 1;
        let sha = format!("pushed-{}", state.counter);
        state.commits.insert(
            sha.clone(),
            CommitInfo {
                sha: sha.clone(),
                message: message.to_string(),
                tree_sha: tree.to_string(),
                parents: parents.to_vec(),
                files: Vec::new(),
            },
        );
        Ok(sha)
    }

    async fn update_ref(&self, branch: &str, sha: &str) -> Result<()> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .branches
            .entry(branch.to_string())
            .or_default()
            .push(sha.to_string());
        Ok(())
    }

    async fn list_commits(&self, branch: &str) -> Result<Vec<String>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let mut commits = state.branches.get(branch).cloned().unwrap_or_default();
        commits.reverse();
        Ok(commits)
    }

    async fn get_commit(&self, sha: &str) -> Result<CommitInfo> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .commits
            .get(sha)
            .cloned()
            .ok_or_else(|| WorkbenchError::remote("get_commit", format!("no commit {}", sha)))
    }

    async fn get_content(&self, path: &str, git_ref: &str) -> Result<Option<String>> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .contents
            .get(&(git_ref.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| WorkbenchError::remote("get_content", format!("no {} at {}", path, git_ref)))
    }
}
