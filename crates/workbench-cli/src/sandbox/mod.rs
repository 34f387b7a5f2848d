//! Local-directory sandbox
//!
//! The project directory on the host plays the container: sandbox paths are
//! host paths under the canonical project root, processes run with the root
//! as working directory. Runtime events (ports, preview messages) are only
//! what callers inject through [`LocalSandbox::emit`].

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::broadcast;
use tracing::{debug, info};
use workbench_core::ports::{Sandbox, SandboxBooter};
use workbench_core::sync::IgnoreRules;
use workbench_core::{FileEntry, FileMap, ProcessOutput, Result, SandboxEvent, WorkbenchError};

pub struct LocalSandbox {
    root: PathBuf,
    work_dir: String,
    events: broadcast::Sender<SandboxEvent>,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let (events, _) = broadcast::channel(256);
        Self {
            work_dir: root.to_string_lossy().to_string(),
            root,
            events,
        }
    }

    /// Publish a runtime event to subscribers
    pub fn emit(&self, event: SandboxEvent) {
        let _ = self.events.send(event);
    }

    /// Host path for a sandbox path, refusing anything outside the root
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path)
            .strip_prefix(&self.root)
            .map_err(|_| WorkbenchError::InvalidPath(path.to_string()))?;
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(WorkbenchError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn work_dir(&self) -> &str {
        &self.work_dir
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        tokio::fs::write(&target, content).await?;
        debug!("Wrote {} ({} bytes)", target.display(), content.len());
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        tokio::fs::create_dir_all(&target).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        let metadata = match tokio::fs::metadata(&target).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&target).await?;
        } else {
            tokio::fs::remove_file(&target).await?;
        }
        debug!("Removed {}", target.display());
        Ok(())
    }

    async fn spawn(
        &self,
        command: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutput> {
        let child = Command::new(command)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkbenchError::Sandbox(format!("Failed to spawn {}: {}", command, e)))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| WorkbenchError::CommandTimeout {
                command: command.to_string(),
                seconds: timeout.as_secs(),
            })??;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<SandboxEvent> {
        self.events.subscribe()
    }
}

/// Hands out one shared [`LocalSandbox`]
pub struct LocalBooter {
    sandbox: Arc<LocalSandbox>,
}

impl LocalBooter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            sandbox: Arc::new(LocalSandbox::new(root)),
        }
    }

    /// The sandbox every boot returns, usable before booting to inject events
    pub fn sandbox(&self) -> Arc<LocalSandbox> {
        self.sandbox.clone()
    }
}

#[async_trait]
impl SandboxBooter for LocalBooter {
    async fn boot(&self) -> Result<Arc<dyn Sandbox>> {
        tokio::fs::create_dir_all(&self.sandbox.root).await?;
        info!("Local sandbox rooted at {}", self.sandbox.work_dir);
        Ok(self.sandbox.clone())
    }
}

/// Read a project directory into a file map keyed by absolute path
///
/// Paths matching the default ignore rules (`.git/`, `node_modules/`, ...)
/// are skipped. Content that is not valid UTF-8 is kept base64 encoded and
/// flagged binary.
pub async fn load_directory(root: &Path) -> Result<FileMap> {
    let rules = IgnoreRules::parse(None);
    let mut entries = FileMap::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut reader = tokio::fs::read_dir(&dir).await?;
        while let Some(item) = reader.next_entry().await? {
            let path = item.path();
            let Some(relative) = relative_key(root, &path) else {
                continue;
            };
            let file_type = item.file_type().await?;

            if file_type.is_dir() {
                if rules.is_ignored(&format!("{}/", relative)) {
                    continue;
                }
                entries.insert(path.to_string_lossy().to_string(), FileEntry::Folder);
                pending.push(path);
            } else if file_type.is_file() {
                if rules.is_ignored(&relative) {
                    continue;
                }
                let bytes = tokio::fs::read(&path).await?;
                let entry = match String::from_utf8(bytes) {
                    Ok(content) if !content.contains('\0') => FileEntry::File {
                        content,
                        is_binary: false,
                    },
                    Ok(content) => FileEntry::File {
                        content: STANDARD.encode(content.as_bytes()),
                        is_binary: true,
                    },
                    Err(e) => FileEntry::File {
                        content: STANDARD.encode(e.as_bytes()),
                        is_binary: true,
                    },
                };
                entries.insert(path.to_string_lossy().to_string(), entry);
            }
        }
    }

    debug!("Loaded {} entries from {}", entries.len(), root.display());
    Ok(entries)
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    Some(
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/"),
    )
}
