//! CLI command implementations

pub mod helper;
pub mod history;
pub mod install;
pub mod maintenance;
pub mod password;
pub mod plan;

use std::path::{Path, PathBuf};

use anyhow::Result;
use engage_core::types::{parse_resource_list, Resource};
use engage_core::user_error::codes;
use engage_core::{DeploymentHome, EngineSettings, UserError};
use engage_install::{DriverRegistry, EngineOptions, InstallContext};
use engage_secrets::{resolve_master_password, PasswordProvider, PasswordRepository, SecureString};
use tracing::{debug, info};

use crate::cli::GlobalArgs;

/// Resolve the deployment home from `--deployment-home`/`ENGAGE_HOME` or the default
pub fn resolve_home(global: &GlobalArgs) -> Result<DeploymentHome> {
    match &global.deployment_home {
        Some(dir) => Ok(DeploymentHome::new(dir.as_std_path())),
        None => DeploymentHome::from_env(),
    }
}

/// Load `config/engage.yaml`, reporting a broken file as a configuration error
pub fn load_settings(home: &DeploymentHome) -> Result<EngineSettings> {
    let path = home.settings_file();
    EngineSettings::load(&path).map_err(|e| {
        UserError::new(&codes::SETTINGS_INVALID)
            .arg("path", path.display())
            .arg("reason", &e)
            .into()
    })
}

/// Master password from the configured sources, if any
pub fn master_password(global: &GlobalArgs, home: &DeploymentHome) -> Result<Option<SecureString>> {
    let explicit = global.master_password_file.as_ref().map(|p| p.as_std_path());
    let resolved = resolve_master_password(explicit, &home.master_password_file())
        .map_err(|e| anyhow::Error::from(e.to_user_error()))?;
    Ok(resolved.map(|(password, source)| {
        debug!("Using master password from {:?}", source);
        password
    }))
}

/// Unlock the password repository when it exists and a master password is available
fn password_provider(global: &GlobalArgs, home: &DeploymentHome) -> Result<PasswordProvider> {
    let repo_file = home.password_repository_file();
    if !repo_file.exists() {
        debug!("No password repository at {}", repo_file.display());
        return Ok(PasswordProvider::Unavailable);
    }
    let Some(master) = master_password(global, home)? else {
        info!("Password repository present but no master password supplied");
        return Ok(PasswordProvider::Unavailable);
    };
    let repo = PasswordRepository::load_from_file(&repo_file, &home.password_salt_file(), &master)
        .map_err(|e| anyhow::Error::from(e.to_user_error()))?;
    Ok(PasswordProvider::Repository(repo))
}

/// Everything a lifecycle command needs: home, settings, context, drivers
pub struct Session {
    pub ctx: InstallContext,
    pub registry: DriverRegistry,
    force_stop_on_error: bool,
}

impl Session {
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let home = resolve_home(global)?;
        let settings = load_settings(&home)?;

        let mut ctx = InstallContext::new(home, settings).with_dry_run(global.dry_run);
        if !global.dry_run {
            let passwords = password_provider(global, &ctx.home)?;
            ctx = ctx.with_passwords(passwords);
        }

        let registry = DriverRegistry::load(&ctx.home.drivers_file())?;

        Ok(Self {
            ctx,
            registry,
            force_stop_on_error: global.force_stop_on_error,
        })
    }

    pub fn options(&self, node: Option<String>) -> EngineOptions {
        EngineOptions {
            node,
            force_stop_on_error: self.force_stop_on_error,
            ..EngineOptions::default()
        }
    }
}

/// Read a resource list, reporting problems as a configuration error
pub fn read_resources(path: &Path) -> Result<Vec<Resource>> {
    let invalid = |reason: &dyn std::fmt::Display| -> anyhow::Error {
        UserError::new(&codes::RESOURCE_FILE_INVALID)
            .arg("path", path.display())
            .arg("reason", reason)
            .into()
    };
    let content = std::fs::read_to_string(path).map_err(|e| invalid(&e))?;
    parse_resource_list(&content).map_err(|e| invalid(&e))
}

/// Resolve a user-supplied directory against the current directory
pub fn absolute(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        Ok(dir.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}
