//! Backup, uninstall and restore of a recorded installation

use std::fs;
use std::path::{Path, PathBuf};

use engage_backup::compression::archive_extension;
use engage_backup::error::codes as backup_codes;
use engage_backup::BackupStore;
use engage_core::types::Resource;
use engage_core::{InstalledResourceDatabase, UserError};
use tracing::{error, info, warn};

use super::{EngineOptions, Runtime, DATABASE_BACKUP_FILE, HOME_ARCHIVE_STEM};
use crate::context::InstallContext;
use crate::errors;
use crate::registry::DriverRegistry;
use crate::sequencer::Interrupted;

/// Path of the deployment home archive inside `backup_dir`
pub fn home_archive_path(backup_dir: &Path, compress: bool) -> PathBuf {
    backup_dir.join(format!("{}.{}", HOME_ARCHIVE_STEM, archive_extension(compress)))
}

/// Backs up every installed resource and the deployment home's config.
///
/// Services running before the backup are restarted afterwards, also when
/// the backup fails.
pub struct BackupEngine<'a> {
    runtime: Runtime<'a>,
}

impl<'a> BackupEngine<'a> {
    pub fn new(ctx: &'a InstallContext, registry: &'a DriverRegistry) -> Self {
        Self {
            runtime: Runtime::new(ctx, registry),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.runtime.options = options;
        self
    }

    pub fn run(&self, backup_dir: &Path) -> anyhow::Result<Vec<String>> {
        let runtime = &self.runtime;
        let ctx = runtime.ctx;
        let compress = ctx.settings.compress_backups;
        let db = runtime.load_database()?;
        if db.is_empty() {
            warn!("No installed resources recorded; backing up configuration only");
        }
        let (_, managed) = runtime.installed(&db)?;

        if !ctx.dry_run {
            fs::create_dir_all(backup_dir)?;
        }

        let mut sequencer = runtime.sequencer();
        let (stopped, result): (Vec<String>, anyhow::Result<Vec<String>>) = match sequencer.stop_services(&managed) {
            Err(Interrupted { report, cause }) => (report.stopped_services, Err(cause.into())),
            Ok(stopped) => {
                let result = sequencer
                    .backup(&managed, backup_dir, compress)
                    .map_err(|interrupted| anyhow::Error::from(interrupted.cause))
                    .and_then(|report| {
                        self.save_home(backup_dir, db.resources())?;
                        Ok(report.processed)
                    });
                (stopped, result)
            }
        };

        if !stopped.is_empty() && !ctx.dry_run {
            info!("Restarting {} services", stopped.len());
            if let Err(e) = sequencer.start_services(&managed, Some(stopped.as_slice())) {
                error!("Could not restart services after backup: {:#}", e);
                if result.is_ok() {
                    return Err(e);
                }
            }
        }

        if result.is_err() {
            runtime.after_failure(&mut sequencer, &managed);
        }
        result
    }

    /// Archive the config directory and store the database next to it.
    ///
    /// The database copy is always the whole deployment, also for a node run.
    fn save_home(&self, backup_dir: &Path, resources: &[Resource]) -> anyhow::Result<()> {
        let ctx = self.runtime.ctx;
        let compress = ctx.settings.compress_backups;
        let archive = home_archive_path(backup_dir, compress);

        if ctx.dry_run {
            info!("[dry-run] Would archive {} to {}", ctx.home.config_dir().display(), archive.display());
            return Ok(());
        }

        let mut copy = InstalledResourceDatabase::new(backup_dir.join(DATABASE_BACKUP_FILE));
        copy.replace(resources.to_vec())?;
        copy.save()?;

        let store = BackupStore::new().with_compression(compress);
        store
            .save(&[ctx.home.config_dir()], &archive, false)
            .map_err(|e| {
                UserError::new(&backup_codes::BACKUP_FAILED)
                    .arg("id", "deployment home")
                    .arg("archive", archive.display())
                    .arg("reason", &e)
            })?;
        info!("Archived deployment configuration to {}", archive.display());
        Ok(())
    }
}

/// Resources outside `ids` that depend on one of them
fn dependents_outside<'d>(db: &'d InstalledResourceDatabase, ids: &[String]) -> Vec<&'d str> {
    db.resources()
        .iter()
        .filter(|r| !ids.contains(&r.id))
        .filter(|r| r.dependency_ids().any(|dep| ids.iter().any(|id| id == dep)))
        .map(|r| r.id.as_str())
        .collect()
}

/// Uninstalls the recorded resources and drops them from the database.
///
/// A node run refuses to remove a host that resources on other nodes still
/// depend on.
pub struct UninstallEngine<'a> {
    runtime: Runtime<'a>,
}

impl<'a> UninstallEngine<'a> {
    pub fn new(ctx: &'a InstallContext, registry: &'a DriverRegistry) -> Self {
        Self {
            runtime: Runtime::new(ctx, registry),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.runtime.options = options;
        self
    }

    /// Uninstall in reverse order, saving resource state to `backup_dir`
    pub fn run(&self, backup_dir: &Path) -> anyhow::Result<Vec<String>> {
        let runtime = &self.runtime;
        let ctx = runtime.ctx;
        let mut db = runtime.load_database()?;
        if db.is_empty() {
            info!("Nothing is installed");
            return Ok(Vec::new());
        }
        let (plan, managed) = runtime.installed(&db)?;

        if let Some(host) = &runtime.options.node {
            let dependents = dependents_outside(&db, plan.order());
            if !dependents.is_empty() {
                return Err(UserError::new(&errors::NODE_HAS_DEPENDENTS)
                    .arg("host", host)
                    .arg("ids", dependents.join(", "))
                    .into());
            }
        }

        let mut sequencer = runtime.sequencer();
        match sequencer.uninstall(&managed, backup_dir, ctx.settings.compress_backups) {
            Ok(report) => {
                runtime.update_database(&mut db, plan.order(), Vec::new())?;
                info!("Uninstalled {} resources", report.processed.len());
                Ok(report.processed)
            }
            Err(interrupted) => {
                runtime.after_failure(&mut sequencer, &managed);
                Err(interrupted.cause.into())
            }
        }
    }
}

/// Restores an installation from a backup directory.
///
/// A node run restores that host's partition and merges it into the database.
pub struct RestoreEngine<'a> {
    runtime: Runtime<'a>,
}

impl<'a> RestoreEngine<'a> {
    pub fn new(ctx: &'a InstallContext, registry: &'a DriverRegistry) -> Self {
        Self {
            runtime: Runtime::new(ctx, registry),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.runtime.options = options;
        self
    }

    /// Restore the resources recorded in `backup_dir` and record them as installed
    pub fn restore(&self, backup_dir: &Path) -> anyhow::Result<Vec<String>> {
        let runtime = &self.runtime;
        let saved_path = backup_dir.join(DATABASE_BACKUP_FILE);
        let saved = InstalledResourceDatabase::load_existing(&saved_path).map_err(|e| {
            UserError::new(&backup_codes::BACKUP_MISSING)
                .arg("id", "installed resources")
                .arg("dir", backup_dir.display())
                .with_developer_message(e.to_string())
        })?;
        let (plan, managed) = runtime.installed(&saved)?;

        let mut sequencer = runtime.sequencer();
        let report = match sequencer.restore(&managed, backup_dir, None) {
            Ok(report) => report,
            Err(e) => {
                runtime.after_failure(&mut sequencer, &managed);
                return Err(e);
            }
        };

        let mut db = runtime.load_database()?;
        runtime.update_database(&mut db, &[], runtime.recorded(&plan, saved.resources()))?;
        info!("Restored {} resources", report.processed.len());
        Ok(report.processed)
    }

    /// Restore the deployment home's config from `backup_dir`; returns the archive used
    pub fn restore_engage(&self, backup_dir: &Path) -> anyhow::Result<PathBuf> {
        let ctx = self.runtime.ctx;
        let archive = [true, false]
            .into_iter()
            .map(|compress| home_archive_path(backup_dir, compress))
            .find(|path| path.exists())
            .ok_or_else(|| {
                UserError::new(&backup_codes::BACKUP_MISSING)
                    .arg("id", "deployment home")
                    .arg("dir", backup_dir.display())
            })?;

        if ctx.dry_run {
            info!("[dry-run] Would restore deployment configuration from {}", archive.display());
            return Ok(archive);
        }

        BackupStore::new().restore(&archive, false).map_err(|e| {
            UserError::new(&backup_codes::RESTORE_FAILED)
                .arg("id", "deployment home")
                .arg("archive", archive.display())
                .arg("reason", &e)
        })?;
        info!("Restored deployment configuration from {}", archive.display());
        Ok(archive)
    }
}
