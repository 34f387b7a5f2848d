//! Push command - Commit a project directory to GitHub

use crate::api::GitHubClient;
use crate::config::{split_repo, FileMetadataStore, Settings, SettingsManager};
use crate::sandbox::load_directory;
use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::ProgressBar;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use workbench_core::ports::MetadataStore;
use workbench_core::{FileStore, GitMetadata, VersionControlSync};

pub async fn run(
    dir: &Path,
    message: &str,
    repo: Option<String>,
    branch: Option<String>,
) -> Result<()> {
    let dir = super::project_dir(dir).await?;
    let settings = SettingsManager::load().context("Failed to load settings")?;
    let credentials = settings
        .credentials
        .clone()
        .context("No GitHub token configured. Run `workbench config set-token` first")?;

    let store = Arc::new(FileMetadataStore::new(SettingsManager::git_state_dir()?));
    let session_id = store.session_for(&dir).await?;
    let existing = store.get(&session_id).await?;
    let explicit = repo.is_some();
    let (repo, branch) = resolve_target(repo, branch, existing.as_ref(), &settings)?;
    split_repo(&repo)?;

    let files = Arc::new(FileStore::new(dir.to_string_lossy().to_string()));
    files.load(load_directory(&dir).await?).await?;

    let host = Arc::new(GitHubClient::new(
        &settings.api_url,
        &repo,
        &credentials.token,
    )?);
    let sync = VersionControlSync::new(session_id, host, store, files);

    match existing {
        Some(metadata) if metadata.remote_url == repo && metadata.branch == branch => {
            if metadata.disconnected {
                if !explicit {
                    anyhow::bail!(
                        "Repository {} is disconnected. Run again with --repo {} to reconnect",
                        repo,
                        repo
                    );
                }
                sync.reconnect()
                    .await
                    .with_context(|| format!("Failed to reconnect to {}", repo))?;
                println!("{} Reconnected to {}", "✓".green(), repo.cyan());
            }
        }
        _ => {
            sync.connect(&repo, &branch)
                .await
                .with_context(|| format!("Failed to connect to {}", repo))?;
            println!("{} Connected to {} ({})", "✓".green(), repo.cyan(), branch);
        }
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Pushing to {}...", repo));
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = sync.push(message).await;
    spinner.finish_and_clear();
    let outcome = result.with_context(|| format!("Push to {} failed", repo))?;

    println!(
        "{} Pushed {} files to {}@{} ({})",
        "✅".green(),
        outcome.files_pushed,
        repo.cyan(),
        branch,
        short_sha(&outcome.commit_sha).dimmed()
    );
    if outcome.files_ignored > 0 {
        println!(
            "  {}",
            format!("{} files skipped by ignore rules", outcome.files_ignored).dimmed()
        );
    }
    Ok(())
}

/// Command line first, then the project's stored link, then the settings
fn resolve_target(
    repo: Option<String>,
    branch: Option<String>,
    existing: Option<&GitMetadata>,
    settings: &Settings,
) -> Result<(String, String)> {
    let repo = repo
        .or_else(|| existing.map(|m| m.remote_url.clone()))
        .or_else(|| settings.repository.as_ref().map(|r| r.name.clone()))
        .context("No repository given. Pass --repo owner/name or run `workbench config set-repo`")?;

    let branch = branch
        .or_else(|| {
            existing
                .filter(|m| m.remote_url == repo)
                .map(|m| m.branch.clone())
        })
        .or_else(|| {
            settings
                .repository
                .as_ref()
                .filter(|r| r.name == repo)
                .map(|r| r.branch.clone())
        })
        .unwrap_or_else(|| settings.engine.default_branch.clone());

    Ok((repo, branch))
}

pub fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositorySettings;

    fn settings() -> Settings {
        Settings {
            repository: Some(RepositorySettings {
                name: "octo/app".to_string(),
                branch: "develop".to_string(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_prefers_command_line() {
        let existing = GitMetadata::new("octo/old", "trunk");
        let (repo, branch) = resolve_target(
            Some("octo/new".to_string()),
            None,
            Some(&existing),
            &settings(),
        )
        .unwrap();
        assert_eq!(repo, "octo/new");
        assert_eq!(branch, "main");
    }

    #[test]
    fn test_resolve_reuses_stored_link() {
        let existing = GitMetadata::new("octo/old", "trunk");
        let (repo, branch) = resolve_target(None, None, Some(&existing), &settings()).unwrap();
        assert_eq!((repo.as_str(), branch.as_str()), ("octo/old", "trunk"));
    }

    #[test]
    fn test_resolve_falls_back_to_settings() {
        let (repo, branch) = resolve_target(None, None, None, &settings()).unwrap();
        assert_eq!((repo.as_str(), branch.as_str()), ("octo/app", "develop"));
        assert!(resolve_target(None, None, None, &Settings::default()).is_err());
    }

    #[test]
    fn test_short_sha() {
        assert_eq!(short_sha("0123456789abcdef"), "0123456");
        assert_eq!(short_sha("abc"), "abc");
    }
}
