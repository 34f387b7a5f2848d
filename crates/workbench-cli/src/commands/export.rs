//! Export command - Zip a project directory

use crate::config::SettingsManager;
use crate::sandbox::load_directory;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use workbench_core::export::build_archive;
use workbench_core::FileStore;

pub async fn run(dir: &Path, out: &Path) -> Result<()> {
    let dir = super::project_dir(dir).await?;
    let settings = SettingsManager::load().context("Failed to load settings")?;

    println!("{}", "📦 Exporting project...".cyan().bold());

    let files = FileStore::new(dir.to_string_lossy().to_string());
    files.load(load_directory(&dir).await?).await?;

    let archive = build_archive(&files, &settings.engine.export)
        .await
        .context("Failed to build archive")?;
    tokio::fs::write(out, &archive)
        .await
        .with_context(|| format!("Failed to write archive {:?}", out))?;

    println!(
        "{} {} files → {} ({} bytes)",
        "✓".green(),
        files.file_count().await,
        out.display().to_string().cyan(),
        archive.len()
    );
    Ok(())
}
