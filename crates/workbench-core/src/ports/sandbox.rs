//! Sandbox container runtime

use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use workbench_types::{ProcessOutput, SandboxEvent};

/// Handle to a booted sandbox container
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Absolute directory project files live under
    fn work_dir(&self) -> &str;

    /// Write a file at an absolute sandbox path; parents must exist
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Create a directory and its parents
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Remove a file or directory recursively
    async fn remove(&self, path: &str) -> Result<()>;

    /// Run a one-shot process to completion
    async fn spawn(&self, command: &str, args: &[String], timeout: Duration)
        -> Result<ProcessOutput>;

    /// Subscribe to port, server-ready and preview-message events
    fn subscribe(&self) -> broadcast::Receiver<SandboxEvent>;
}

/// Boots a sandbox; called at most once per session
#[async_trait]
pub trait SandboxBooter: Send + Sync {
    async fn boot(&self) -> Result<Arc<dyn Sandbox>>;
}
