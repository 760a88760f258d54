//! Driver configured entirely by shell commands
//!
//! Each lifecycle step maps to an optional shell command in `drivers.yaml`.
//! Commands may reference `{config.<name>}` for a config port value,
//! `{id}` for the resource id and `{package}` for the package location.

use std::path::{Path, PathBuf};

use engage_core::types::Resource;
use engage_core::UserError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::InstallContext;
use crate::errors;
use crate::exec::{run_checked, run_command, shell, CommandOutput};
use crate::manager::{BackupFiles, Package, ResourceManager, ServiceManager};
use crate::process::pid_file_alive;

/// Commands and files for one driver entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommandSpec {
    pub install: String,

    #[serde(default)]
    pub uninstall: Option<String>,

    /// Exits 0 when the resource is installed
    #[serde(default)]
    pub is_installed: Option<String>,

    /// Path whose existence means the resource is installed
    #[serde(default)]
    pub installed_marker: Option<PathBuf>,

    /// Post-install check; exits 0 on success
    #[serde(default)]
    pub validate: Option<String>,

    #[serde(default)]
    pub upgrade: Option<String>,

    #[serde(default)]
    pub start: Option<String>,

    #[serde(default)]
    pub stop: Option<String>,

    /// Exits 0 while the service runs; used when there is no pid file
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub pid_file: Option<PathBuf>,

    /// Run mutating commands through sudo
    #[serde(default)]
    pub sudo: bool,

    /// Executables that must be on PATH before installing
    #[serde(default)]
    pub required_executables: Vec<String>,

    /// Absolute paths holding the resource's persistent state
    #[serde(default)]
    pub backup_files: Vec<PathBuf>,
}

impl CommandSpec {
    fn is_service(&self) -> bool {
        self.start.is_some()
    }

    /// Whether the spec can tell an installed resource from a missing one
    pub fn detects_install(&self) -> bool {
        self.installed_marker.is_some() || self.is_installed.is_some()
    }
}

pub struct CommandDriver {
    resource: Resource,
    spec: CommandSpec,
}

impl CommandDriver {
    pub fn new(resource: Resource, spec: CommandSpec) -> Self {
        Self { resource, spec }
    }

    /// Substitute placeholders in a command template
    pub fn expand(&self, template: &str, package: Option<&Package>) -> String {
        let mut out = template.replace("{id}", &self.resource.id);
        if let Some(location) = package.and_then(|p| p.location.as_deref()) {
            out = out.replace("{package}", location);
        }
        for (name, value) in &self.resource.config_port {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&format!("{{config.{}}}", name), &rendered);
        }
        out
    }

    /// Run a mutating step, honouring dry-run and sudo
    fn run_step(&self, ctx: &InstallContext, step: &str, template: &str, package: Option<&Package>) -> anyhow::Result<CommandOutput> {
        let command = self.expand(template, package);
        if ctx.dry_run {
            info!("[dry-run] {} {}: {}", step, self.resource.id, command);
            return Ok(CommandOutput {
                status: Some(0),
                ..CommandOutput::default()
            });
        }

        debug!("{} {}: {}", step, self.resource.id, command);
        let (program, args) = shell(&command);
        if self.spec.sudo {
            ctx.run_elevated(&program, &args)
        } else {
            run_checked(&program, &args)
        }
    }

    /// Run a read-only check and report whether it exited 0
    fn check(&self, template: &str) -> anyhow::Result<bool> {
        let (program, args) = shell(&self.expand(template, None));
        Ok(run_command(&program, &args)?.success())
    }
}

impl ResourceManager for CommandDriver {
    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn validate_pre_install(&self, ctx: &InstallContext) -> anyhow::Result<()> {
        for program in &self.spec.required_executables {
            if which::which(program).is_err() {
                return Err(UserError::new(&errors::MISSING_EXECUTABLE)
                    .arg("program", program)
                    .for_resource(&self.resource.id)
                    .into());
            }
        }

        if self.spec.sudo && !crate::sudo::is_superuser() && ctx.sudo_password().is_none() {
            return Err(UserError::new(&errors::SUDO_PASSWORD_REQUIRED)
                .arg("command", &self.spec.install)
                .arg("user", ctx.user())
                .for_resource(&self.resource.id)
                .into());
        }
        Ok(())
    }

    /// The registry only builds command drivers with an install check, so
    /// a spec with neither reports not installed.
    fn is_installed(&self, _ctx: &InstallContext) -> anyhow::Result<bool> {
        if let Some(marker) = &self.spec.installed_marker {
            return Ok(marker.exists());
        }
        match &self.spec.is_installed {
            Some(template) => self.check(template),
            None => Ok(false),
        }
    }

    fn install(&self, ctx: &InstallContext, package: &Package) -> anyhow::Result<()> {
        self.run_step(ctx, "install", &self.spec.install, Some(package))?;
        Ok(())
    }

    fn validate_post_install(&self, ctx: &InstallContext) -> anyhow::Result<()> {
        let fail = |reason: String| -> anyhow::Error {
            UserError::new(&errors::POST_INSTALL_VALIDATION_FAILED)
                .arg("id", &self.resource.id)
                .arg("reason", reason)
                .for_resource(&self.resource.id)
                .into()
        };

        if let Some(template) = &self.spec.validate {
            if !self.check(template)? {
                return Err(fail(format!("`{}` did not exit 0", self.expand(template, None))));
            }
        }
        if self.spec.detects_install() && !self.is_installed(ctx)?
        {
            return Err(fail("install completed but the resource is not detected".to_string()));
        }
        Ok(())
    }

    fn backup(&self, ctx: &InstallContext, backup_dir: &Path, compress: bool) -> anyhow::Result<()> {
        self.backup_file_list(ctx, backup_dir, compress)
    }

    fn uninstall(
        &self,
        ctx: &InstallContext,
        backup_dir: &Path,
        incomplete_install: bool,
        compress: bool,
    ) -> anyhow::Result<()> {
        self.move_file_list(ctx, backup_dir, compress, incomplete_install)?;

        if let Some(template) = &self.spec.uninstall {
            match self.run_step(ctx, "uninstall", template, None) {
                Ok(_) => {}
                Err(e) if incomplete_install => {
                    warn!(
                        "Uninstall of partially installed {} reported: {:#}",
                        self.resource.id, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn restore(&self, ctx: &InstallContext, backup_dir: &Path, package: &Package) -> anyhow::Result<()> {
        if !self.is_installed(ctx)? {
            self.install(ctx, package)?;
        }
        self.restore_file_list(ctx, backup_dir)
    }

    fn upgrade(
        &self,
        ctx: &InstallContext,
        package: &Package,
        _old: &Resource,
        _backup_dir: &Path,
    ) -> anyhow::Result<()> {
        match &self.spec.upgrade {
            Some(template) => {
                self.run_step(ctx, "upgrade", template, Some(package))?;
            }
            None => {
                if !self.is_installed(ctx)? {
                    self.install(ctx, package)?;
                }
            }
        }
        Ok(())
    }

    fn as_service(&self) -> Option<&dyn ServiceManager> {
        if self.spec.is_service() {
            Some(self)
        } else {
            None
        }
    }
}

impl BackupFiles for CommandDriver {
    fn backup_files(&self) -> &[PathBuf] {
        &self.spec.backup_files
    }
}

impl ServiceManager for CommandDriver {
    fn start(&self, ctx: &InstallContext) -> anyhow::Result<()> {
        if let Some(template) = &self.spec.start {
            self.run_step(ctx, "start", template, None)?;
        }
        Ok(())
    }

    fn stop(&self, ctx: &InstallContext) -> anyhow::Result<()> {
        if let Some(template) = &self.spec.stop {
            self.run_step(ctx, "stop", template, None)?;
        }
        Ok(())
    }

    fn is_running(&self, _ctx: &InstallContext) -> anyhow::Result<bool> {
        if let Some(pid_file) = &self.spec.pid_file {
            return Ok(pid_file_alive(pid_file)?);
        }
        match &self.spec.status {
            Some(template) => self.check(template),
            None => Ok(false),
        }
    }

    fn get_pid_file_path(&self) -> Option<PathBuf> {
        self.spec.pid_file.clone()
    }
}
