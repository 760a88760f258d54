use std::fs;
use std::path::{Path, PathBuf};

use engage_backup::error::codes as backup_codes;
use engage_core::types::Resource;
use engage_core::user_error::codes;
use engage_core::{InstalledResourceDatabase, UserError};
use tracing::{error, info, warn};

use super::{EngineOptions, InstallEngine, Runtime, DATABASE_BACKUP_FILE};
use crate::context::InstallContext;
use crate::manager::ManagedResource;
use crate::registry::DriverRegistry;
use crate::sequencer::{rollback_failed, InstallSequencer, Interrupted, SequenceOutcome};

/// Default directory, under the deployment home, for the previous installation
pub const UPGRADE_BACKUP_DIR: &str = "upgrade_backup";

/// Replaces the recorded installation with a new resource list.
///
/// The previous installation is stopped and uninstalled into the backup
/// directory, together with a copy of its database. If removing it fails
/// partway, or the new list fails to install and the sequencer rolls it back,
/// the previous installation is restored from that directory and the run
/// reports `UPGRADE_ROLLBACK_IN_PROGRESS`.
pub struct UpgradeEngine<'a> {
    runtime: Runtime<'a>,
    backup_dir: PathBuf,
}

impl<'a> UpgradeEngine<'a> {
    pub fn new(ctx: &'a InstallContext, registry: &'a DriverRegistry) -> Self {
        Self {
            runtime: Runtime::new(ctx, registry),
            backup_dir: ctx.home.root().join(UPGRADE_BACKUP_DIR),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.runtime.options = options;
        self
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn run(&self, resources: Vec<Resource>) -> anyhow::Result<Vec<String>> {
        let runtime = &self.runtime;
        let ctx = runtime.ctx;
        let mut db = runtime.load_database()?;

        if db.is_empty() {
            warn!("Nothing is recorded as installed; performing a fresh install");
            return InstallEngine::new(ctx, runtime.registry)
                .with_options(runtime.options.clone())
                .run(resources);
        }

        let new_plan = runtime.plan(resources.clone(), true)?;
        let new_managed = runtime.instantiate(&new_plan)?;
        let (old_plan, old_managed) = runtime.installed(&db)?;
        let old_resources = old_plan.to_resources();
        self.prepare_backup_dir(db.resources())?;

        info!(
            "Upgrading {} installed resources to {} resources",
            old_resources.len(),
            new_managed.len()
        );
        let mut sequencer = runtime.sequencer();
        if let Err(interrupted) = sequencer.uninstall(&old_managed, &self.backup_dir, ctx.settings.compress_backups) {
            return Err(self.undo_partial_uninstall(&mut sequencer, &old_managed, interrupted).into());
        }

        let outcome = match sequencer.upgrade(&new_managed, &old_resources, &self.backup_dir) {
            Ok(outcome) => outcome,
            Err(e) => {
                runtime.after_failure(&mut sequencer, &new_managed);
                return Err(e);
            }
        };

        match outcome {
            SequenceOutcome::Completed(ids) => {
                runtime.update_database(&mut db, old_plan.order(), runtime.recorded(&new_plan, &resources))?;
                info!("Upgrade complete");
                Ok(ids)
            }
            SequenceOutcome::RollbackSucceeded { resource_id, cause } => {
                warn!("Restoring the previous installation from {}", self.backup_dir.display());
                let restored = sequencer.restore(&old_managed, &self.backup_dir, None).map(|_| ());
                Err(self.rollback_outcome(&mut sequencer, &old_managed, restored, resource_id, cause).into())
            }
            SequenceOutcome::RollbackFailed {
                resource_id,
                cause,
                rollback_cause,
            } => {
                runtime.after_failure(&mut sequencer, &new_managed);
                Err(rollback_failed(resource_id, cause, rollback_cause).into())
            }
        }
    }

    /// Put back what was removed before uninstalling the previous
    /// installation failed, and restart the services stopped for it
    fn undo_partial_uninstall(
        &self,
        sequencer: &mut InstallSequencer<'_>,
        previous: &[ManagedResource],
        interrupted: Interrupted,
    ) -> UserError {
        let Interrupted { report, cause } = interrupted;
        let resource_id = cause
            .resource_id
            .clone()
            .unwrap_or_else(|| "previous installation".to_string());
        error!("Removing the previous installation failed: {}", cause);
        warn!(
            "Restoring {} removed resources from {}",
            report.processed.len(),
            self.backup_dir.display()
        );

        let dry_run = self.runtime.ctx.dry_run;
        let restored = sequencer
            .restore(previous, &self.backup_dir, Some(report.processed.as_slice()))
            .and_then(|_| {
                if dry_run {
                    return Ok(Vec::new());
                }
                sequencer.start_services(previous, Some(report.stopped_services.as_slice()))
            })
            .map(|_| ());
        self.rollback_outcome(sequencer, previous, restored, resource_id, cause)
    }

    /// Error for an upgrade that failed at `resource_id`, given whether the
    /// previous installation was put back
    fn rollback_outcome(
        &self,
        sequencer: &mut InstallSequencer<'_>,
        previous: &[ManagedResource],
        restored: anyhow::Result<()>,
        resource_id: String,
        cause: UserError,
    ) -> UserError {
        match restored {
            Ok(()) => UserError::new(&codes::UPGRADE_ROLLBACK_IN_PROGRESS)
                .arg("id", &resource_id)
                .arg("cause", cause.render())
                .for_resource(resource_id)
                .with_original(cause),
            Err(e) => {
                error!("Restoring the previous installation failed: {:#}", e);
                self.runtime.after_failure(sequencer, previous);
                rollback_failed(resource_id, cause, self.restore_error(&e))
            }
        }
    }

    /// Empty the backup directory and store the previous database in it
    fn prepare_backup_dir(&self, old_resources: &[Resource]) -> anyhow::Result<()> {
        if self.runtime.ctx.dry_run {
            info!("[dry-run] Would back up the previous installation to {}", self.backup_dir.display());
            return Ok(());
        }
        if self.backup_dir.exists() {
            warn!("Discarding stale upgrade backup at {}", self.backup_dir.display());
            fs::remove_dir_all(&self.backup_dir)?;
        }
        fs::create_dir_all(&self.backup_dir)?;

        let mut copy = InstalledResourceDatabase::new(self.backup_dir.join(DATABASE_BACKUP_FILE));
        copy.replace(old_resources.to_vec())?;
        copy.save()?;
        Ok(())
    }

    fn restore_error(&self, err: &anyhow::Error) -> UserError {
        match err.downcast_ref::<UserError>() {
            Some(user_error) => user_error.clone(),
            None => UserError::new(&backup_codes::RESTORE_FAILED)
                .arg("id", "previous installation")
                .arg("archive", self.backup_dir.display())
                .arg("reason", err)
                .with_developer_message(format!("{:#}", err)),
        }
    }
}
