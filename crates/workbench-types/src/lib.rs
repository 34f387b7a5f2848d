//! Workbench Types - Pure data model
//!
//! Data shared by the orchestration engine and its front ends: actions streamed
//! by the AI layer, artifacts, the project file tree, previews, runtime errors
//! and version-control metadata. No async runtime, no IO.

pub mod action;
pub mod artifact;
pub mod code_error;
pub mod file;
pub mod git;
pub mod preview;
pub mod sandbox;

pub use action::*;
pub use artifact::*;
pub use code_error::*;
pub use file::*;
pub use git::*;
pub use preview::*;
pub use sandbox::*;
