//! Pull command - Apply remote commits to a project directory

use crate::api::GitHubClient;
use crate::commands::push::short_sha;
use crate::config::{FileMetadataStore, SettingsManager};
use crate::sandbox::{load_directory, LocalBooter};
use crate::terminal::PtyBackend;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use workbench_core::ports::MetadataStore;
use workbench_core::{VersionControlSync, WorkbenchOrchestrator};

pub async fn run(dir: &Path) -> Result<()> {
    let dir = super::project_dir(dir).await?;
    let settings = SettingsManager::load().context("Failed to load settings")?;
    let credentials = settings
        .credentials
        .clone()
        .context("No GitHub token configured. Run `workbench config set-token` first")?;

    let store = Arc::new(FileMetadataStore::new(SettingsManager::git_state_dir()?));
    let session_id = store.session_for(&dir).await?;
    let metadata = store
        .get(&session_id)
        .await?
        .context("Project is not connected to a repository. Run `workbench push` first")?;
    if metadata.disconnected {
        anyhow::bail!(
            "Repository {} is disconnected. Run `workbench push --repo {}` to reconnect",
            metadata.remote_url,
            metadata.remote_url
        );
    }

    let config = super::engine_config(&dir)?;
    let orchestrator = WorkbenchOrchestrator::new(
        config,
        Arc::new(LocalBooter::new(&dir)),
        Arc::new(PtyBackend::new()),
    );
    orchestrator
        .files()
        .load(load_directory(&dir).await?)
        .await?;

    let host = Arc::new(GitHubClient::new(
        &settings.api_url,
        &metadata.remote_url,
        &credentials.token,
    )?);
    let sync = VersionControlSync::new(
        session_id,
        host,
        store,
        orchestrator.files().clone(),
    );

    let result = match sync.poll_once().await {
        Ok(Some(update)) => {
            let (added, changed, removed) =
                (update.added.len(), update.changed.len(), update.removed.len());
            let sha = update.sha.clone();
            let message = update.message.clone();
            orchestrator
                .merge_remote_update(update)
                .await
                .context("Failed to apply remote commit")?;
            println!(
                "{} {} {}",
                "✓".green(),
                short_sha(&sha).dimmed(),
                message.lines().next().unwrap_or_default()
            );
            println!(
                "  {} added, {} changed, {} removed",
                added.to_string().green(),
                changed.to_string().yellow(),
                removed.to_string().red()
            );
            Ok(())
        }
        Ok(None) => {
            println!("{} Already up to date", "✓".green());
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to poll {}", metadata.remote_url)),
    };

    orchestrator.dispose().await;
    result
}
