//! Engine settings loaded from `config/engage.yaml`
//!
//! Precedence (low to high): built-in defaults, the settings file, CLI flags
//! applied by the caller.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::Result;

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineSettings {
    /// Service liveness polling
    #[serde(default)]
    pub poll: PollSettings,

    /// Gzip resource backups
    #[serde(default = "default_compress_backups")]
    pub compress_backups: bool,

    /// Privilege escalation
    #[serde(default)]
    pub sudo: SudoSettings,

    /// Binary that runs the elevated backup helper; defaults to the current executable
    #[serde(default)]
    pub helper_program: Option<PathBuf>,

    /// Name of the structured error file under `log/`
    #[serde(default = "default_error_file_name")]
    pub error_file_name: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll: PollSettings::default(),
            compress_backups: default_compress_backups(),
            sudo: SudoSettings::default(),
            helper_program: None,
            error_file_name: default_error_file_name(),
        }
    }
}

/// Fixed-interval polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PollSettings {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_attempts: default_poll_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SudoSettings {
    #[serde(default = "default_sudo_program")]
    pub program: String,
}

impl Default for SudoSettings {
    fn default() -> Self {
        Self {
            program: default_sudo_program(),
        }
    }
}

fn default_compress_backups() -> bool {
    true
}
fn default_error_file_name() -> String {
    "user_error.json".to_string()
}
fn default_poll_interval() -> u64 {
    500
}
fn default_poll_attempts() -> u32 {
    20
}
fn default_sudo_program() -> String {
    "sudo".to_string()
}

impl EngineSettings {
    /// Load settings, returning defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: EngineSettings = serde_yaml_ng::from_str(&content)?;
        debug!("Loaded engine settings from {}", path.display());
        Ok(settings)
    }
}
