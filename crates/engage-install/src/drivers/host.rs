//! Driver for the machine itself
//!
//! A host is always installed. Pre- and post-install validation compare the
//! resource's `os` config property with the running system. When the host is
//! the install target, pre-install validation also checks its `hostname`
//! against this machine.

use std::path::Path;

use engage_core::types::Resource;
use engage_core::UserError;
use tracing::{debug, warn};

use crate::context::InstallContext;
use crate::errors;
use crate::manager::{Package, ResourceManager};

/// Config property naming the expected operating system
pub const OS_PROPERTY: &str = "os";

/// Config property naming the machine a host resource stands for
pub const HOSTNAME_PROPERTY: &str = "hostname";

pub struct HostDriver {
    resource: Resource,
}

impl HostDriver {
    pub fn new(resource: Resource) -> Self {
        Self { resource }
    }

    fn check_os(&self) -> anyhow::Result<()> {
        let Some(expected) = self.resource.config_str(OS_PROPERTY) else {
            return Ok(());
        };
        let actual = std::env::consts::OS;
        if os_matches(expected, actual) {
            debug!("Host {} runs {} as expected", self.resource.id, actual);
            return Ok(());
        }
        Err(UserError::new(&errors::WRONG_OS)
            .arg("id", &self.resource.id)
            .arg("expected", expected)
            .arg("actual", actual)
            .for_resource(&self.resource.id)
            .into())
    }

    fn check_target_machine(&self) -> anyhow::Result<()> {
        if !self.resource.properties.use_as_install_target {
            return Ok(());
        }
        let Some(expected) = self.resource.config_str(HOSTNAME_PROPERTY) else {
            return Ok(());
        };
        let actual = whoami::fallible::hostname().unwrap_or_else(|e| {
            warn!("Could not read this machine's hostname: {}", e);
            "unknown".to_string()
        });
        if hostname_matches(expected, &actual) {
            debug!("Install target {} is this machine ({})", self.resource.id, actual);
            return Ok(());
        }
        Err(UserError::new(&errors::HOST_MISMATCH)
            .arg("id", &self.resource.id)
            .arg("expected", expected)
            .arg("actual", &actual)
            .for_resource(&self.resource.id)
            .into())
    }
}

/// Loopback names match any machine; otherwise compare case-insensitively,
/// accepting a short name for a fully qualified one
fn hostname_matches(expected: &str, actual: &str) -> bool {
    let expected = expected.to_ascii_lowercase();
    let actual = actual.to_ascii_lowercase();
    if matches!(expected.as_str(), "localhost" | "127.0.0.1" | "::1") {
        return true;
    }
    let short = |name: &str| name.split('.').next().unwrap_or_default().to_string();
    expected == actual || short(&expected) == short(&actual)
}

/// Accepts common aliases such as `mac-osx` for `macos`
fn os_matches(expected: &str, actual: &str) -> bool {
    let normalized = expected.to_ascii_lowercase();
    let normalized = match normalized.as_str() {
        "mac-osx" | "macosx" | "osx" | "darwin" => "macos",
        other => other,
    };
    normalized == actual || normalized.starts_with(&format!("{}-", actual))
}

impl ResourceManager for HostDriver {
    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn validate_pre_install(&self, _ctx: &InstallContext) -> anyhow::Result<()> {
        self.check_os()?;
        self.check_target_machine()
    }

    fn is_installed(&self, _ctx: &InstallContext) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn install(&self, _ctx: &InstallContext, _package: &Package) -> anyhow::Result<()> {
        Ok(())
    }

    fn validate_post_install(&self, _ctx: &InstallContext) -> anyhow::Result<()> {
        self.check_os()
    }

    fn uninstall(
        &self,
        _ctx: &InstallContext,
        _backup_dir: &Path,
        _incomplete_install: bool,
        _compress: bool,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn restore(&self, _ctx: &InstallContext, _backup_dir: &Path, _package: &Package) -> anyhow::Result<()> {
        Ok(())
    }
}
