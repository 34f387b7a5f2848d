//! Configuration management

mod metadata;

pub use metadata::FileMetadataStore;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use workbench_core::WorkbenchConfig;
use workbench_types::GitCredentials;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default repository pushes and pulls target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySettings {
    /// `owner/name`
    pub name: String,
    pub branch: String,
}

/// Persisted CLI settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<GitCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositorySettings>,
    pub engine: WorkbenchConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            credentials: None,
            repository: None,
            engine: WorkbenchConfig::default(),
        }
    }
}

pub struct SettingsManager;

impl SettingsManager {
    /// Get the workbench home directory (~/.workbench)
    pub fn workbench_home() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("WORKBENCH_HOME") {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".workbench"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::workbench_home()?.join("settings.json"))
    }

    /// Directory holding per-project git metadata
    pub fn git_state_dir() -> Result<PathBuf> {
        Ok(Self::workbench_home()?.join("git"))
    }

    /// Load settings from disk with `WORKBENCH_*` environment overrides applied
    pub fn load() -> Result<Settings> {
        let settings = Self::load_file(&Self::settings_path()?)?;
        layered(&settings, None)
    }

    /// Load settings from disk as stored, without environment overrides
    pub fn load_stored() -> Result<Settings> {
        Self::load_file(&Self::settings_path()?)
    }

    fn load_file(path: &Path) -> Result<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {:?}", path))
    }

    /// Save settings to disk
    pub fn save(settings: &Settings) -> Result<()> {
        let path = Self::settings_path()?;
        Self::save_to(&path, settings)
    }

    fn save_to(path: &Path, settings: &Settings) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let content =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

        // Holds the git token; created owner-only
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(path)
            .with_context(|| format!("Failed to open settings file {:?}", path))?;

        // `mode` only applies on creation
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write settings to {:?}", path))?;

        Ok(())
    }
}

/// Layer `WORKBENCH_*` variables over stored settings
///
/// Nested keys use `__`, e.g. `WORKBENCH_ENGINE__SHELL=/bin/zsh`.
/// `env` replaces the process environment when given.
fn layered(stored: &Settings, env: Option<HashMap<String, String>>) -> Result<Settings> {
    let base = serde_json::to_string(stored).context("Failed to serialize settings")?;
    let merged = config::Config::builder()
        .add_source(config::File::from_str(&base, config::FileFormat::Json))
        .add_source(
            config::Environment::with_prefix("WORKBENCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()
        .context("Failed to merge environment overrides")?;
    merged
        .try_deserialize()
        .context("Invalid settings after environment overrides")
}

/// Parse `owner/name`
pub fn split_repo(repo: &str) -> Result<(&str, &str)> {
    match repo.trim().split_once('/') {
        Some((owner, name))
            if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((owner, name))
        }
        _ => anyhow::bail!("Invalid repository: {}. Expected owner/name", repo),
    }
}
