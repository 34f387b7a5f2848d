//! Workbench Core - Orchestration engine
//!
//! Turns a stream of AI-generated actions into running, observable and
//! synchronized application state inside a sandbox container:
//! - `files` / `editor`: the authoritative file tree and open documents
//! - `terminal`: interactive shell sessions
//! - `runner` / `queue` / `sampler`: ordered, idempotent action execution
//! - `preview`: preview servers and runtime error collection
//! - `sync`: remote git mirror
//! - `orchestrator`: the per-session façade wiring all of the above

pub mod config;
pub mod editor;
pub mod error;
pub mod errors;
pub mod export;
pub mod files;
pub mod orchestrator;
pub mod ports;
pub mod preview;
pub mod queue;
pub mod runner;
pub mod sampler;
pub mod sync;
pub mod terminal;

pub use workbench_types::*;

pub use config::{ExportConfig, WorkbenchConfig};
pub use editor::{EditorDocument, EditorDocumentStore, ScrollPosition};
pub use error::{Result, WorkbenchError};
pub use errors::{fix_errors_message, CodeErrorQueue};
pub use files::FileStore;
pub use orchestrator::{Enqueued, WorkbenchOrchestrator};
pub use preview::{PreviewManager, PreviewNotice};
pub use queue::{ExecutionQueue, QueueTicket};
pub use runner::{ActionOutcome, ActionRunner};
pub use sampler::Sampler;
pub use sync::VersionControlSync;
pub use terminal::{TerminalId, TerminalManager};
