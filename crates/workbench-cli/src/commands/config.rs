//! Config command - Manage CLI configuration

use crate::config::{split_repo, RepositorySettings, Settings, SettingsManager};
use anyhow::{Context, Result};
use colored::Colorize;
use workbench_types::GitCredentials;

/// Store the GitHub token
pub async fn set_token(token: &str, owner: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("Token must not be empty");
    }

    let mut settings = SettingsManager::load_stored().context("Failed to load settings")?;
    settings.credentials = Some(GitCredentials {
        owner: owner.trim().to_string(),
        token: token.to_string(),
    });
    SettingsManager::save(&settings).context("Failed to save settings")?;

    println!("{} Token saved for {}", "✓".green(), owner.cyan());
    Ok(())
}

/// Set the default repository
pub async fn set_repo(repo: &str, branch: Option<String>) -> Result<()> {
    let (owner, name) = split_repo(repo)?;
    let repo = format!("{}/{}", owner, name);

    let mut settings = SettingsManager::load_stored().context("Failed to load settings")?;
    let branch = branch.unwrap_or_else(|| settings.engine.default_branch.clone());
    settings.repository = Some(RepositorySettings {
        name: repo.clone(),
        branch: branch.clone(),
    });
    SettingsManager::save(&settings).context("Failed to save settings")?;

    println!("{} Default repository set to {} ({})", "✓".green(), repo.cyan(), branch);
    Ok(())
}

/// Show current configuration
pub async fn show() -> Result<()> {
    let settings = SettingsManager::load().context("Failed to load settings")?;

    println!("{}", "Workbench Configuration".bold().underline());
    println!();

    println!("{}", "GitHub:".cyan().bold());
    println!("  API URL:    {}", settings.api_url);
    match &settings.credentials {
        Some(credentials) => {
            println!("  Owner:      {}", credentials.owner);
            println!("  Token:      {}", mask(&credentials.token).dimmed());
        }
        None => println!("  {}", "No token configured".yellow()),
    }
    match &settings.repository {
        Some(repository) => println!(
            "  Repository: {} ({})",
            repository.name.cyan(),
            repository.branch
        ),
        None => println!("  Repository: {}", "not set".dimmed()),
    }
    println!();

    let engine = &settings.engine;
    println!("{}", "Engine:".cyan().bold());
    println!("  Shell:                {}", engine.shell);
    println!("  Sampler window:       {} ms", engine.sampler_window_ms);
    println!(
        "  Error collection:     {} ms",
        engine.error_collection_window_ms
    );
    println!(
        "  Reload cooldown:      {} s",
        engine.hydration_reload_cooldown_secs
    );
    println!("  Git poll interval:    {} s", engine.git_poll_interval_secs);
    println!("  Shell timeout:        {} s", engine.shell_timeout_secs);
    println!(
        "  Terminal size:        {}x{}",
        engine.terminal_cols, engine.terminal_rows
    );
    println!("  Default branch:       {}", engine.default_branch);
    println!();

    println!("{}", "Export:".cyan().bold());
    println!(
        "  {}: {}={}, {}={}",
        engine.export.env_file,
        engine.export.api_base_url_key,
        engine.export.api_base_url,
        engine.export.query_mode_key,
        engine.export.query_mode
    );
    println!();

    println!("{}", "Config Files:".cyan().bold());
    println!(
        "  Settings: {}",
        SettingsManager::settings_path()?.display().to_string().dimmed()
    );
    println!(
        "  Git state: {}",
        SettingsManager::git_state_dir()?.display().to_string().dimmed()
    );

    Ok(())
}

/// Reset configuration to defaults
pub async fn reset(yes: bool) -> Result<()> {
    use dialoguer::Confirm;

    if !yes {
        let confirm = Confirm::new()
            .with_prompt(
                "Are you sure you want to reset all configuration? This deletes the stored token.",
            )
            .default(false)
            .interact()?;

        if !confirm {
            println!("{}", "Reset cancelled.".yellow());
            return Ok(());
        }
    }

    SettingsManager::save(&Settings::default()).context("Failed to save default settings")?;

    println!("{} Configuration reset to defaults.", "✓".green());
    Ok(())
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{}{}", visible, "*".repeat(token.chars().count().saturating_sub(4).min(12)))
}
