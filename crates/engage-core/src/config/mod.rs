//! Deployment home layout and engine settings

mod settings;

pub use settings::{EngineSettings, PollSettings, SudoSettings};

use std::path::{Path, PathBuf};

use crate::utils::get_home_dir;

/// Environment variable naming the deployment home
pub const ENGAGE_HOME_ENV: &str = "ENGAGE_HOME";

/// Default deployment home directory name under the user's home
pub const DEFAULT_HOME_DIR: &str = ".engage";

/// Paths inside a deployment home
///
/// ```text
/// <home>/
///   config/installed_resources.json
///   config/pw_repository
///   config/pw_salt
///   config/master.pw
///   config/drivers.yaml
///   config/engage.yaml
///   log/engage.log
///   log/user_error.json
///   log/events.jsonl
///   failed_upgrade/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentHome {
    root: PathBuf,
}

impl DeploymentHome {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve from `ENGAGE_HOME`, falling back to `~/.engage`
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(root) = std::env::var(ENGAGE_HOME_ENV) {
            if !root.is_empty() {
                return Ok(Self::new(root));
            }
        }
        Ok(Self::new(get_home_dir()?.join(DEFAULT_HOME_DIR)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    pub fn installed_resources_file(&self) -> PathBuf {
        self.config_dir().join("installed_resources.json")
    }

    pub fn password_repository_file(&self) -> PathBuf {
        self.config_dir().join("pw_repository")
    }

    pub fn password_salt_file(&self) -> PathBuf {
        self.config_dir().join("pw_salt")
    }

    pub fn master_password_file(&self) -> PathBuf {
        self.config_dir().join("master.pw")
    }

    pub fn drivers_file(&self) -> PathBuf {
        self.config_dir().join("drivers.yaml")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir().join("engage.yaml")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join("engage.log")
    }

    pub fn events_file(&self) -> PathBuf {
        self.log_dir().join("events.jsonl")
    }

    /// Error file location, honoring the configured file name
    pub fn error_file(&self, settings: &EngineSettings) -> PathBuf {
        self.log_dir().join(&settings.error_file_name)
    }

    /// Where a failing upgrade's resources are uninstalled to
    pub fn failed_upgrade_dir(&self) -> PathBuf {
        self.root.join("failed_upgrade")
    }

    /// Create the config and log directories
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.log_dir())
    }
}
