//! Terminal PTY abstraction traits

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// Terminal backend for spawning interactive shells inside the sandbox
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// Spawn a new terminal session
    async fn spawn(
        &self,
        shell: &str,
        cwd: &str,
        env: &HashMap<String, String>,
        cols: u16,
        rows: u16,
    ) -> Result<Box<dyn TerminalSession>>;
}

/// Active terminal session
///
/// Methods take `&self`; implementations synchronize internally.
#[async_trait]
pub trait TerminalSession: Send + Sync {
    /// Resize the terminal
    async fn resize(&self, cols: u16, rows: u16) -> Result<()>;

    /// Write data to the terminal
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Read data from the terminal (non-blocking)
    async fn read(&self) -> Result<Option<Bytes>>;

    /// Kill the terminal session
    async fn kill(&self) -> Result<()>;

    /// Check if the session is still alive
    fn is_alive(&self) -> bool;

    /// Get the process ID
    fn pid(&self) -> u32;

    /// Get the exit code if the process has exited
    fn exit_code(&self) -> Option<i32>;
}
