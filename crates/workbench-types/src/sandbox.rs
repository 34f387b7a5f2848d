//! Events reported by the sandbox container

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortEventKind {
    Open,
    Close,
}

/// Kind of message posted by the running application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewMessageKind {
    UncaughtException,
    UnhandledRejection,
    ConsoleError,
}

/// Error report forwarded from the application running in a preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewMessage {
    pub kind: PreviewMessageKind,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub pathname: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Sandbox runtime notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SandboxEvent {
    Port {
        port: u16,
        kind: PortEventKind,
        url: String,
    },
    ServerReady {
        port: u16,
        url: String,
    },
    /// The preview finished loading a page
    PageLoaded {
        port: u16,
    },
    PreviewMessage(PreviewMessage),
}

/// Result of a one-shot process spawned in the sandbox
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
