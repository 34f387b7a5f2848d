//! Subcommand implementations

pub mod config;
pub mod export;
pub mod pull;
pub mod push;
pub mod replay;

use crate::config::SettingsManager;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Canonical absolute form of a project directory, created when missing
pub async fn project_dir(dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create project directory {:?}", dir))?;
    tokio::fs::canonicalize(dir)
        .await
        .with_context(|| format!("Failed to resolve project directory {:?}", dir))
}

/// Engine config for a project rooted at `dir`
pub fn engine_config(dir: &Path) -> Result<workbench_core::WorkbenchConfig> {
    let settings = SettingsManager::load().context("Failed to load settings")?;
    let mut engine = settings.engine;
    engine.work_dir = dir.to_string_lossy().to_string();
    engine
        .validate()
        .context("Invalid engine configuration")?;
    Ok(engine)
}
