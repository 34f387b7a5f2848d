//! Native PTY terminal backend

use async_trait::async_trait;
use bytes::Bytes;
use portable_pty::{
    Child, ChildKiller, CommandBuilder, MasterPty, NativePtySystem, PtySize, PtySystem,
};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use workbench_core::ports::{TerminalBackend, TerminalSession};
use workbench_core::{Result, WorkbenchError};

#[derive(Default)]
pub struct PtyBackend;

impl PtyBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TerminalBackend for PtyBackend {
    async fn spawn(
        &self,
        shell: &str,
        cwd: &str,
        env: &HashMap<String, String>,
        cols: u16,
        rows: u16,
    ) -> Result<Box<dyn TerminalSession>> {
        let pty_system = NativePtySystem::default();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(pty_error)?;

        let mut cmd_builder = CommandBuilder::new(shell);
        cmd_builder.cwd(cwd);
        for (key, value) in env {
            cmd_builder.env(key, value);
        }

        let child = pair.slave.spawn_command(cmd_builder).map_err(pty_error)?;
        drop(pair.slave);
        let pid = child.process_id().unwrap_or(0);
        debug!("Spawned {} in PTY with PID {}", shell, pid);

        let mut reader = pair.master.try_clone_reader().map_err(pty_error)?;
        let writer = pair.master.take_writer().map_err(pty_error)?;

        // Blocking reads live on their own thread; the session drains the channel
        let (output_tx, output_rx) = mpsc::unbounded_channel::<Bytes>();
        tokio::task::spawn_blocking(move || {
            let mut local_buf = [0u8; 4096];
            loop {
                match reader.read(&mut local_buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx
                            .send(Bytes::copy_from_slice(&local_buf[..n]))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("PTY reader stopped: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Box::new(PtySession {
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
            output: Mutex::new(output_rx),
            pid,
            exit_code: Mutex::new(None),
        }))
    }
}

pub struct PtySession {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    output: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    pid: u32,
    exit_code: Mutex<Option<i32>>,
}

impl PtySession {
    /// Poll the child, caching its exit code
    fn poll_exit(&self) -> Option<i32> {
        let mut cached = match self.exit_code.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if cached.is_none() {
            if let Ok(mut child) = self.child.lock() {
                if let Ok(Some(status)) = child.try_wait() {
                    *cached = Some(status.exit_code() as i32);
                }
            }
        }
        *cached
    }
}

#[async_trait]
impl TerminalSession for PtySession {
    async fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let master = self
            .master
            .lock()
            .map_err(|_| WorkbenchError::Terminal("PTY master lock poisoned".to_string()))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(pty_error)
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| WorkbenchError::Terminal("PTY writer lock poisoned".to_string()))?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    async fn read(&self) -> Result<Option<Bytes>> {
        let mut output = self
            .output
            .lock()
            .map_err(|_| WorkbenchError::Terminal("PTY output lock poisoned".to_string()))?;
        match output.try_recv() {
            Ok(data) => Ok(Some(data)),
            Err(_) => Ok(None),
        }
    }

    async fn kill(&self) -> Result<()> {
        let mut child = self
            .child
            .lock()
            .map_err(|_| WorkbenchError::Terminal("PTY child lock poisoned".to_string()))?;
        if let Err(e) = child.kill() {
            warn!("Failed to kill PTY process {}: {}", self.pid, e);
            return Err(e.into());
        }
        if let Ok(status) = child.wait() {
            if let Ok(mut cached) = self.exit_code.lock() {
                *cached = Some(status.exit_code() as i32);
            }
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.poll_exit().is_none()
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn exit_code(&self) -> Option<i32> {
        self.poll_exit()
    }
}

fn pty_error(e: impl std::fmt::Display) -> WorkbenchError {
    WorkbenchError::Terminal(e.to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn read_until(session: &dyn TerminalSession, needle: &str) -> String {
        let mut output = String::new();
        for _ in 0..250 {
            while let Some(chunk) = session.read().await.unwrap() {
                output.push_str(&String::from_utf8_lossy(&chunk));
            }
            if output.contains(needle) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        output
    }

    #[tokio::test]
    async fn test_shell_round_trip() {
        let backend = PtyBackend::new();
        let env = HashMap::from([("WB_GREETING".to_string(), "hi-there".to_string())]);
        let session = backend.spawn("/bin/sh", "/", &env, 80, 24).await.unwrap();
        assert!(session.is_alive());
        assert!(session.pid() > 0);

        session.write(b"echo \"$WB_GREETING\"-ok\n").await.unwrap();
        let output = read_until(session.as_ref(), "hi-there-ok").await;
        assert!(output.contains("hi-there-ok"));

        session.resize(100, 40).await.unwrap();
        session.kill().await.unwrap();
        assert!(!session.is_alive());
        assert!(session.exit_code().is_some());
    }
}
