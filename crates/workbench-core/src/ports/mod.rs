//! Port traits (interfaces) for dependency injection

pub mod deploy;
pub mod git_host;
pub mod sandbox;
pub mod shell;
pub mod storage;
pub mod terminal;

pub use deploy::{DeployConfig, DeployProgress, DeploymentProvider, DeploymentResult};
pub use git_host::{GitHost, TreeEntry};
pub use sandbox::{Sandbox, SandboxBooter};
pub use shell::{CommandOutput, CommandShell, ShellSource};
pub use storage::{MemoryMetadataStore, MetadataStore};
pub use terminal::{TerminalBackend, TerminalSession};
