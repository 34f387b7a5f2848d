//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of one workbench session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    /// Absolute sandbox directory every project path is rooted at
    pub work_dir: String,
    /// Program spawned for terminal sessions
    pub shell: String,
    pub sampler_window_ms: u64,
    pub error_collection_window_ms: u64,
    pub hydration_reload_cooldown_secs: u64,
    pub git_poll_interval_secs: u64,
    pub shell_timeout_secs: u64,
    pub terminal_cols: u16,
    pub terminal_rows: u16,
    pub default_branch: String,
    pub export: ExportConfig,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            work_dir: "/home/project".to_string(),
            shell: "/bin/bash".to_string(),
            sampler_window_ms: 100,
            error_collection_window_ms: 2000,
            hydration_reload_cooldown_secs: 30,
            git_poll_interval_secs: 30,
            shell_timeout_secs: 600,
            terminal_cols: 80,
            terminal_rows: 24,
            default_branch: "main".to_string(),
            export: ExportConfig::default(),
        }
    }
}

impl WorkbenchConfig {
    pub fn sampler_window(&self) -> Duration {
        Duration::from_millis(self.sampler_window_ms)
    }

    pub fn error_collection_window(&self) -> Duration {
        Duration::from_millis(self.error_collection_window_ms)
    }

    pub fn hydration_reload_cooldown(&self) -> Duration {
        Duration::from_secs(self.hydration_reload_cooldown_secs)
    }

    pub fn git_poll_interval(&self) -> Duration {
        Duration::from_secs(self.git_poll_interval_secs)
    }

    pub fn shell_timeout(&self) -> Duration {
        Duration::from_secs(self.shell_timeout_secs)
    }

    /// Reject values that would break the engine's timing assumptions
    pub fn validate(&self) -> crate::Result<()> {
        if !self.work_dir.starts_with('/') {
            return Err(crate::WorkbenchError::Config(format!(
                "work_dir must be absolute, got {}",
                self.work_dir
            )));
        }
        if self.sampler_window_ms == 0 {
            return Err(crate::WorkbenchError::Config(
                "sampler_window_ms must be greater than zero".to_string(),
            ));
        }
        if self.git_poll_interval_secs == 0 {
            return Err(crate::WorkbenchError::Config(
                "git_poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.default_branch.trim().is_empty() {
            return Err(crate::WorkbenchError::Config(
                "default_branch must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Standalone-export compatibility shim for the `.env` file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub env_file: String,
    pub api_base_url_key: String,
    pub api_base_url: String,
    pub query_mode_key: String,
    pub query_mode: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            env_file: ".env".to_string(),
            api_base_url_key: "VITE_API_BASE_URL".to_string(),
            api_base_url: "http://localhost:3000".to_string(),
            query_mode_key: "VITE_QUERY_MODE".to_string(),
            query_mode: "direct".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: WorkbenchConfig =
            serde_json::from_str(r#"{"work_dir": "/srv/app", "export": {"query_mode": "proxy"}}"#)
                .unwrap();
        assert_eq!(config.work_dir, "/srv/app");
        assert_eq!(config.sampler_window(), Duration::from_millis(100));
        assert_eq!(config.export.query_mode, "proxy");
        assert_eq!(config.export.env_file, ".env");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_relative_work_dir() {
        let config = WorkbenchConfig {
            work_dir: "project".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
