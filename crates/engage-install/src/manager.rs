//! The resource manager contract
//!
//! A driver implements [`ResourceManager`] for one resource instance. Drivers
//! for long-running processes also implement [`ServiceManager`] and return
//! themselves from [`ResourceManager::as_service`]. Every method receives the
//! [`InstallContext`] explicitly; drivers hold no global state.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use engage_backup::error::codes as backup_codes;
use engage_backup::{calculate_checksum, BackupIndex, BackupRecord, SaveOptions};
use engage_core::types::Resource;
use engage_core::UserError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::InstallContext;

/// Kind of artifact a package points at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    /// Nothing to fetch; the driver knows how to install itself
    #[default]
    None,
    /// A name understood by a system package manager
    Reference,
    /// A local file
    File,
    /// A local archive to unpack
    Archive,
    /// A remote location
    Url,
}

/// Installable artifact for a resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub kind: PackageKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Package {
    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            kind: PackageKind::Reference,
            location: Some(name.into()),
        }
    }
}

/// Driver for one resource instance
pub trait ResourceManager {
    fn resource(&self) -> &Resource;

    fn id(&self) -> &str {
        &self.resource().id
    }

    /// Check prerequisites without changing the machine
    fn validate_pre_install(&self, ctx: &InstallContext) -> anyhow::Result<()>;

    fn is_installed(&self, ctx: &InstallContext) -> anyhow::Result<bool>;

    fn install(&self, ctx: &InstallContext, package: &Package) -> anyhow::Result<()>;

    /// Confirm the install took effect
    fn validate_post_install(&self, ctx: &InstallContext) -> anyhow::Result<()>;

    /// Archive persistent state into `backup_dir`; stateless resources do nothing
    fn backup(&self, _ctx: &InstallContext, _backup_dir: &Path, _compress: bool) -> anyhow::Result<()> {
        Ok(())
    }

    /// Remove the resource, moving its state into `backup_dir`.
    ///
    /// With `incomplete_install` set the resource may be half-installed and
    /// missing files are skipped.
    fn uninstall(
        &self,
        ctx: &InstallContext,
        backup_dir: &Path,
        incomplete_install: bool,
        compress: bool,
    ) -> anyhow::Result<()>;

    /// Reinstate the resource from `backup_dir`
    fn restore(&self, ctx: &InstallContext, backup_dir: &Path, package: &Package) -> anyhow::Result<()>;

    /// Move from `old` to this resource's version.
    ///
    /// The default only installs when nothing is installed yet.
    fn upgrade(
        &self,
        ctx: &InstallContext,
        package: &Package,
        _old: &Resource,
        _backup_dir: &Path,
    ) -> anyhow::Result<()> {
        if !self.is_installed(ctx)? {
            self.install(ctx, package)?;
        }
        Ok(())
    }

    fn as_service(&self) -> Option<&dyn ServiceManager> {
        None
    }
}

/// Lifecycle of a long-running process
pub trait ServiceManager {
    fn start(&self, ctx: &InstallContext) -> anyhow::Result<()>;

    fn stop(&self, ctx: &InstallContext) -> anyhow::Result<()>;

    fn is_running(&self, ctx: &InstallContext) -> anyhow::Result<bool>;

    fn get_pid_file_path(&self) -> Option<PathBuf> {
        None
    }

    /// Best-effort stop used during rollback; never fails.
    ///
    /// Returns true if the service is known to be stopped afterwards.
    fn force_stop(&self, ctx: &InstallContext) -> bool {
        match self.stop(ctx) {
            Ok(()) => true,
            Err(e) => {
                warn!("Force stop failed: {:#}", e);
                false
            }
        }
    }
}

/// A driver paired with the package it installs
pub struct ManagedResource {
    pub manager: Box<dyn ResourceManager>,
    pub package: Package,
}

impl ManagedResource {
    pub fn new(manager: Box<dyn ResourceManager>, package: Package) -> Self {
        Self { manager, package }
    }

    pub fn id(&self) -> &str {
        self.manager.id()
    }

    pub fn resource(&self) -> &Resource {
        self.manager.resource()
    }

    pub fn service(&self) -> Option<&dyn ServiceManager> {
        self.manager.as_service()
    }
}

impl fmt::Debug for ManagedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedResource")
            .field("id", &self.id())
            .field("key", &self.resource().key)
            .field("package", &self.package)
            .finish()
    }
}

/// Drivers whose persistent state is a fixed list of paths.
///
/// The provided methods implement backup, uninstall and restore of that
/// list on top of [`save_resource_files`] and [`restore_resource_files`].
pub trait BackupFiles: ResourceManager {
    fn backup_files(&self) -> &[PathBuf];

    /// Copy the files into `backup_dir`
    fn backup_file_list(&self, ctx: &InstallContext, backup_dir: &Path, compress: bool) -> anyhow::Result<()> {
        if self.backup_files().is_empty() {
            return Ok(());
        }
        save_resource_files(ctx, self.id(), self.backup_files(), backup_dir, compress, false, false)
    }

    /// Move the files into `backup_dir`; missing files are skipped for incomplete installs
    fn move_file_list(
        &self,
        ctx: &InstallContext,
        backup_dir: &Path,
        compress: bool,
        incomplete_install: bool,
    ) -> anyhow::Result<()> {
        if self.backup_files().is_empty() {
            return Ok(());
        }
        save_resource_files(
            ctx,
            self.id(),
            self.backup_files(),
            backup_dir,
            compress,
            true,
            incomplete_install,
        )
    }

    fn restore_file_list(&self, ctx: &InstallContext, backup_dir: &Path) -> anyhow::Result<()> {
        if self.backup_files().is_empty() {
            return Ok(());
        }
        restore_resource_files(ctx, self.id(), backup_dir)
    }
}

/// Archive `files` for `resource_id` into `backup_dir` and record it in the
/// directory's index.
///
/// Used by drivers whose state is a fixed list of paths. With `move_files`
/// the originals are deleted once the archive is verified.
pub fn save_resource_files(
    ctx: &InstallContext,
    resource_id: &str,
    files: &[PathBuf],
    backup_dir: &Path,
    compress: bool,
    move_files: bool,
    incomplete_install: bool,
) -> anyhow::Result<()> {
    let name = BackupRecord::archive_name(resource_id, compress);
    let archive = backup_dir.join(&name);

    if ctx.dry_run {
        info!(
            "[dry-run] Would archive {} paths of {} into {}",
            files.len(),
            resource_id,
            archive.display()
        );
        return Ok(());
    }
    std::fs::create_dir_all(backup_dir)?;

    let options = SaveOptions::default()
        .moving(move_files)
        .skipping_missing(incomplete_install);

    ctx.privileged_backup_store(compress)?
        .save(files, &archive, options)
        .map_err(|e| {
            UserError::new(&backup_codes::BACKUP_FAILED)
                .arg("id", resource_id)
                .arg("archive", archive.display())
                .arg("reason", &e)
                .for_resource(resource_id)
                .with_developer_message(format!("{:#}", e))
        })?;

    let checksum = calculate_checksum(&archive).unwrap_or_else(|e| {
        debug!("Cannot checksum {}: {}", archive.display(), e);
        String::new()
    });

    let mut index = BackupIndex::load(backup_dir)?;
    index.insert(BackupRecord {
        resource_id: resource_id.to_string(),
        archive: name,
        checksum,
        created_at: Utc::now(),
        incomplete_install,
    });
    index.save(backup_dir)?;

    info!("Archived {} into {}", resource_id, archive.display());
    Ok(())
}

/// Restore the archive recorded for `resource_id` in `backup_dir`
pub fn restore_resource_files(
    ctx: &InstallContext,
    resource_id: &str,
    backup_dir: &Path,
) -> anyhow::Result<()> {
    let index = BackupIndex::load(backup_dir)?;
    let Some(record) = index.get(resource_id) else {
        return Err(UserError::new(&backup_codes::BACKUP_MISSING)
            .arg("id", resource_id)
            .arg("dir", backup_dir.display())
            .for_resource(resource_id)
            .into());
    };
    let archive = backup_dir.join(&record.archive);

    if ctx.dry_run {
        info!("[dry-run] Would restore {} from {}", resource_id, archive.display());
        return Ok(());
    }

    if !record.checksum.is_empty() {
        let actual = calculate_checksum(&archive)?;
        if actual != record.checksum {
            warn!(
                "Checksum of {} does not match its backup record",
                archive.display()
            );
        }
    }

    let compress = engage_backup::is_gzip_file(&archive)?;
    ctx.privileged_backup_store(compress)?
        .restore(&archive, false)
        .map_err(|e| {
            UserError::new(&backup_codes::RESTORE_FAILED)
                .arg("id", resource_id)
                .arg("archive", archive.display())
                .arg("reason", &e)
                .for_resource(resource_id)
                .with_developer_message(format!("{:#}", e))
        })?;

    info!("Restored {} from {}", resource_id, archive.display());
    Ok(())
}
