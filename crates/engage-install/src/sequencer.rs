//! Runs driver operations over an ordered resource list
//!
//! Install and upgrade walk the list in dependency order. If a resource
//! fails while executing, the sequencer rolls back: the failing resource is
//! force-stopped and uninstalled as an incomplete install, then every resource
//! changed earlier in the run is stopped and uninstalled in reverse order.
//! The outcome reports whether that rollback itself succeeded.
//!
//! Uninstall and backup walk the list in reverse, stopping services first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use engage_core::types::{is_upgrade, Resource};
use engage_core::user_error::codes;
use engage_core::UserError;
use tracing::{debug, error, info, warn};

use crate::context::InstallContext;
use crate::errors::driver_error;
use crate::events::{EventEnvelope, ResourceEvent, ResourceState};
use crate::ledger::StatusLedger;
use crate::manager::ManagedResource;
use crate::process::{wait_for, Liveness};

/// Install behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOptions {
    /// Roll back resources installed by this run when one fails
    pub rollback_on_failure: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            rollback_on_failure: true,
        }
    }
}

/// Result of an install or upgrade run
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceOutcome {
    /// Every resource is installed; ids in install order
    Completed(Vec<String>),
    /// `resource_id` failed and everything this run changed was removed
    RollbackSucceeded { resource_id: String, cause: UserError },
    /// `resource_id` failed and the rollback failed too
    RollbackFailed {
        resource_id: String,
        cause: UserError,
        rollback_cause: UserError,
    },
}

impl SequenceOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SequenceOutcome::Completed(_))
    }

    /// The installed ids, or the structured error an install run reports
    pub fn into_install_result(self) -> Result<Vec<String>, UserError> {
        match self {
            SequenceOutcome::Completed(ids) => Ok(ids),
            SequenceOutcome::RollbackSucceeded { resource_id, cause } => {
                Err(UserError::new(&codes::INSTALL_ROLLED_BACK)
                    .arg("id", &resource_id)
                    .arg("cause", cause.render())
                    .for_resource(resource_id)
                    .with_original(cause))
            }
            SequenceOutcome::RollbackFailed {
                resource_id,
                cause,
                rollback_cause,
            } => Err(rollback_failed(resource_id, cause, rollback_cause)),
        }
    }
}

/// Error reported when a run failed and its rollback failed too
pub fn rollback_failed(resource_id: String, cause: UserError, rollback_cause: UserError) -> UserError {
    UserError::new(&codes::ROLLBACK_FAILED)
        .arg("id", &resource_id)
        .arg("cause", cause.render())
        .arg("rollback_cause", rollback_cause.render())
        .for_resource(resource_id)
        .with_original(cause)
        .with_rollback_error(rollback_cause)
}

/// Ids processed by a maintenance run (backup, uninstall, restore)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub processed: Vec<String>,
    /// Services that were running and got stopped
    pub stopped_services: Vec<String>,
}

impl MaintenanceReport {
    fn interrupted(self, cause: UserError) -> Interrupted {
        Interrupted { report: self, cause }
    }
}

/// A maintenance run that failed partway
#[derive(Debug)]
pub struct Interrupted {
    /// Work finished before the failure
    pub report: MaintenanceReport,
    pub cause: UserError,
}

#[derive(Debug, Default)]
struct Progress {
    /// Indices installed or upgraded by this run
    changed: Vec<usize>,
    /// Indices whose service this run started
    started: Vec<usize>,
}

#[derive(Debug, Default)]
struct StepResult {
    changed: bool,
    started: bool,
}

enum StepFailure {
    /// Stop without rollback
    Halt(UserError),
    /// Roll back; `uninstall_failed` is false when the resource predates the run
    Execution {
        cause: UserError,
        uninstall_failed: bool,
    },
}

/// How failures in one step are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Install,
    Upgrade,
}

pub struct InstallSequencer<'a> {
    ctx: &'a InstallContext,
    ledger: Option<&'a StatusLedger>,
    failed_dir: PathBuf,
    states: HashMap<String, ResourceState>,
}

impl<'a> InstallSequencer<'a> {
    pub fn new(ctx: &'a InstallContext) -> Self {
        Self {
            ctx,
            ledger: None,
            failed_dir: ctx.home.failed_upgrade_dir(),
            states: HashMap::new(),
        }
    }

    pub fn with_ledger(mut self, ledger: &'a StatusLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Directory that receives state of resources removed during rollback
    pub fn with_failed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.failed_dir = dir.into();
        self
    }

    pub fn state(&self, id: &str) -> Option<ResourceState> {
        self.states.get(id).copied()
    }

    fn set_state(&mut self, id: &str, state: ResourceState) {
        self.states.insert(id.to_string(), state);
    }

    fn record(&mut self, id: &str, state: ResourceState, event: ResourceEvent) {
        self.set_state(id, state);
        if let Some(ledger) = self.ledger {
            ledger.record(EventEnvelope::new(id, state, event));
        }
    }

    /// Install every resource that is not installed yet, in order.
    ///
    /// Validation failures stop the run without rollback. Execution failures
    /// roll back unless disabled in `options`.
    pub fn install(
        &mut self,
        resources: &[ManagedResource],
        options: InstallOptions,
    ) -> anyhow::Result<SequenceOutcome> {
        self.run(resources, &[], None, Mode::Install, options)
    }

    /// Upgrade to `resources` from the `previous` installation.
    ///
    /// A resource whose id was installed before at an older or equal version
    /// goes through [`ResourceManager::upgrade`](crate::ResourceManager::upgrade);
    /// anything else is installed. Every failure rolls back.
    pub fn upgrade(
        &mut self,
        resources: &[ManagedResource],
        previous: &[Resource],
        backup_dir: &Path,
    ) -> anyhow::Result<SequenceOutcome> {
        self.run(
            resources,
            previous,
            Some(backup_dir),
            Mode::Upgrade,
            InstallOptions::default(),
        )
    }

    fn run(
        &mut self,
        resources: &[ManagedResource],
        previous: &[Resource],
        backup_dir: Option<&Path>,
        mode: Mode,
        options: InstallOptions,
    ) -> anyhow::Result<SequenceOutcome> {
        let mut progress = Progress::default();

        for (index, managed) in resources.iter().enumerate() {
            self.set_state(managed.id(), ResourceState::Pending);
            let old = previous.iter().find(|r| r.id == managed.id());

            let step = match (old, backup_dir) {
                (Some(old), Some(dir)) if is_upgrade(&managed.resource().key.version, &old.key.version) => {
                    self.upgrade_one(managed, old, dir)
                }
                _ => {
                    if let Some(old) = old {
                        warn!(
                            "{} is older ({}) than the installed version ({}); installing it fresh",
                            managed.id(),
                            managed.resource().key.version,
                            old.key.version
                        );
                    }
                    self.install_one(managed, mode)
                }
            };

            match step {
                Ok(result) => {
                    if result.changed {
                        progress.changed.push(index);
                    }
                    if result.started {
                        progress.started.push(index);
                    }
                }
                Err(StepFailure::Halt(cause)) => {
                    error!("{}", cause);
                    self.set_state(managed.id(), ResourceState::Failed);
                    return Err(cause.into());
                }
                Err(StepFailure::Execution {
                    cause,
                    uninstall_failed,
                }) => {
                    error!("{}", cause);
                    self.record(
                        managed.id(),
                        ResourceState::Failed,
                        ResourceEvent::InstallFailed {
                            resource_id: managed.id().to_string(),
                            key: managed.resource().key.to_string(),
                            error_message: cause.render(),
                        },
                    );
                    if !options.rollback_on_failure {
                        warn!("Rollback disabled; leaving installed resources in place");
                        return Err(cause.into());
                    }
                    return Ok(self.rollback(resources, index, &progress, cause, uninstall_failed));
                }
            }
        }

        Ok(SequenceOutcome::Completed(
            resources.iter().map(|m| m.id().to_string()).collect(),
        ))
    }

    fn install_one(&mut self, managed: &ManagedResource, mode: Mode) -> Result<StepResult, StepFailure> {
        let ctx = self.ctx;
        let manager = managed.manager.as_ref();
        let id = manager.id().to_string();
        let key = manager.resource().key.to_string();
        // Install mode halts on validation errors; upgrade mode rolls back on every error
        let validation_failure = |cause: UserError, uninstall_failed: bool| match mode {
            Mode::Install => StepFailure::Halt(cause),
            Mode::Upgrade => StepFailure::Execution {
                cause,
                uninstall_failed,
            },
        };

        let installed = manager.is_installed(ctx).map_err(|e| StepFailure::Execution {
            cause: driver_error(&e, &id, "is_installed"),
            uninstall_failed: false,
        })?;

        let mut result = StepResult::default();
        if installed {
            debug!("{} is already installed", id);
            self.record(
                &id,
                ResourceState::Installed,
                ResourceEvent::InstallSkipped {
                    resource_id: id.clone(),
                    key,
                },
            );
        } else {
            manager
                .validate_pre_install(ctx)
                .map_err(|e| validation_failure(driver_error(&e, &id, "validate_pre_install"), false))?;
            self.set_state(&id, ResourceState::Validated);

            if ctx.dry_run {
                info!("[dry-run] Would install {} ({})", id, key);
                return Ok(result);
            }

            info!("Installing {} ({})", id, key);
            self.record(
                &id,
                ResourceState::Validated,
                ResourceEvent::InstallStarted {
                    resource_id: id.clone(),
                    key: key.clone(),
                },
            );
            let started_at = Instant::now();
            manager
                .install(ctx, &managed.package)
                .map_err(|e| StepFailure::Execution {
                    cause: driver_error(&e, &id, "install"),
                    uninstall_failed: true,
                })?;
            result.changed = true;

            manager
                .validate_post_install(ctx)
                .map_err(|e| validation_failure(driver_error(&e, &id, "validate_post_install"), true))?;

            self.record(
                &id,
                ResourceState::Installed,
                ResourceEvent::InstallCompleted {
                    resource_id: id.clone(),
                    key,
                    duration_secs: started_at.elapsed().as_secs(),
                },
            );
        }

        if ctx.dry_run {
            return Ok(result);
        }
        result.started = self
            .ensure_running(managed)
            .map_err(|cause| StepFailure::Execution {
                cause,
                uninstall_failed: result.changed,
            })?;
        Ok(result)
    }

    fn upgrade_one(
        &mut self,
        managed: &ManagedResource,
        old: &Resource,
        backup_dir: &Path,
    ) -> Result<StepResult, StepFailure> {
        let ctx = self.ctx;
        let manager = managed.manager.as_ref();
        let id = manager.id().to_string();
        let from_version = old.key.version.clone();
        let to_version = manager.resource().key.version.clone();
        let execution = |cause: UserError| StepFailure::Execution {
            cause,
            uninstall_failed: true,
        };

        if ctx.dry_run {
            info!("[dry-run] Would upgrade {} from {} to {}", id, from_version, to_version);
            return Ok(StepResult::default());
        }

        info!("Upgrading {} from {} to {}", id, from_version, to_version);
        self.record(
            &id,
            ResourceState::Pending,
            ResourceEvent::UpgradeStarted {
                resource_id: id.clone(),
                from_version: from_version.clone(),
                to_version: to_version.clone(),
            },
        );
        let started_at = Instant::now();

        manager
            .upgrade(ctx, &managed.package, old, backup_dir)
            .map_err(|e| execution(driver_error(&e, &id, "upgrade")))?;
        manager
            .validate_post_install(ctx)
            .map_err(|e| execution(driver_error(&e, &id, "validate_post_install")))?;

        self.record(
            &id,
            ResourceState::Installed,
            ResourceEvent::UpgradeCompleted {
                resource_id: id.clone(),
                from_version,
                to_version,
                duration_secs: started_at.elapsed().as_secs(),
            },
        );

        let started = self.ensure_running(managed).map_err(execution)?;
        Ok(StepResult {
            changed: true,
            started,
        })
    }

    /// Start the service if it is not running; true if this call started it
    fn ensure_running(&mut self, managed: &ManagedResource) -> Result<bool, UserError> {
        let Some(service) = managed.service() else {
            return Ok(false);
        };
        let ctx = self.ctx;
        let id = managed.id();

        if service.is_running(ctx).map_err(|e| driver_error(&e, id, "is_running"))? {
            debug!("{} is already running", id);
            return Ok(false);
        }

        info!("Starting {}", id);
        service.start(ctx).map_err(|e| driver_error(&e, id, "start"))?;
        if !ctx.dry_run {
            wait_for(ctx, id, service, Liveness::Running).map_err(|e| driver_error(&e, id, "start"))?;
        }
        self.record(
            id,
            ResourceState::Started,
            ResourceEvent::ServiceStarted {
                resource_id: id.to_string(),
            },
        );
        Ok(true)
    }

    /// Stop the service gracefully, falling back to a force stop.
    ///
    /// Returns true if the service was running.
    fn stop_service(&mut self, managed: &ManagedResource) -> Result<bool, UserError> {
        let Some(service) = managed.service() else {
            return Ok(false);
        };
        let ctx = self.ctx;
        let id = managed.id();

        if !service.is_running(ctx).map_err(|e| driver_error(&e, id, "is_running"))? {
            return Ok(false);
        }

        info!("Stopping {}", id);
        let graceful = service.stop(ctx).and_then(|()| {
            if ctx.dry_run {
                Ok(())
            } else {
                wait_for(ctx, id, service, Liveness::Stopped)
            }
        });

        let forced = match graceful {
            Ok(()) => false,
            Err(e) => {
                let cause = driver_error(&e, id, "stop");
                warn!("{}; forcing stop", cause);
                if !service.force_stop(ctx) {
                    return Err(cause);
                }
                true
            }
        };

        self.record(
            id,
            ResourceState::Stopped,
            ResourceEvent::ServiceStopped {
                resource_id: id.to_string(),
                forced,
            },
        );
        Ok(true)
    }

    fn rollback(
        &mut self,
        resources: &[ManagedResource],
        failed_index: usize,
        progress: &Progress,
        cause: UserError,
        uninstall_failed: bool,
    ) -> SequenceOutcome {
        let ctx = self.ctx;
        let failed = &resources[failed_index];
        let failed_id = failed.id().to_string();
        let failed_dir = self.failed_dir.clone();
        let compress = ctx.settings.compress_backups;
        let mut rollback_error: Option<UserError> = None;

        warn!("Rolling back after failure of {}", failed_id);
        self.record(
            &failed_id,
            ResourceState::Failed,
            ResourceEvent::RollbackStarted {
                failed_resource: failed_id.clone(),
                error_message: cause.render(),
            },
        );

        if let Some(service) = failed.service() {
            if !service.force_stop(ctx) {
                warn!("Could not force-stop {}", failed_id);
            }
        }

        if uninstall_failed {
            match failed.manager.uninstall(ctx, &failed_dir, true, compress) {
                Ok(()) => self.record(
                    &failed_id,
                    ResourceState::Uninstalled,
                    ResourceEvent::UninstallCompleted {
                        resource_id: failed_id.clone(),
                        incomplete_install: true,
                    },
                ),
                Err(e) => {
                    let err = driver_error(&e, &failed_id, "uninstall");
                    error!("Rollback: {}", err);
                    rollback_error.get_or_insert(err);
                }
            }
        }

        // Services started on resources that predate the run
        for &index in progress.started.iter().rev() {
            if progress.changed.contains(&index) {
                continue;
            }
            if let Err(err) = self.stop_service(&resources[index]) {
                error!("Rollback: {}", err);
                rollback_error.get_or_insert(err);
            }
        }

        for &index in progress.changed.iter().rev() {
            let managed = &resources[index];
            let id = managed.id().to_string();

            if let Err(err) = self.stop_service(managed) {
                error!("Rollback: {}", err);
                rollback_error.get_or_insert(err);
                continue;
            }

            match managed.manager.uninstall(ctx, &failed_dir, false, compress) {
                Ok(()) => {
                    info!("Rolled back {}", id);
                    self.record(
                        &id,
                        ResourceState::Uninstalled,
                        ResourceEvent::UninstallCompleted {
                            resource_id: id.clone(),
                            incomplete_install: false,
                        },
                    );
                }
                Err(e) => {
                    let err = driver_error(&e, &id, "uninstall");
                    error!("Rollback: {}", err);
                    self.set_state(&id, ResourceState::Failed);
                    rollback_error.get_or_insert(err);
                }
            }
        }

        match rollback_error {
            None => {
                self.record(
                    &failed_id,
                    ResourceState::Uninstalled,
                    ResourceEvent::RollbackCompleted {
                        failed_resource: failed_id.clone(),
                    },
                );
                SequenceOutcome::RollbackSucceeded {
                    resource_id: failed_id,
                    cause,
                }
            }
            Some(rollback_cause) => {
                self.record(
                    &failed_id,
                    ResourceState::Failed,
                    ResourceEvent::RollbackFailed {
                        failed_resource: failed_id.clone(),
                        error_message: rollback_cause.render(),
                    },
                );
                SequenceOutcome::RollbackFailed {
                    resource_id: failed_id,
                    cause,
                    rollback_cause,
                }
            }
        }
    }

    /// Stop every running service, last resource first.
    ///
    /// On failure the report lists the services stopped so far.
    pub fn stop_services(&mut self, resources: &[ManagedResource]) -> Result<Vec<String>, Interrupted> {
        let mut report = MaintenanceReport::default();
        for managed in resources.iter().rev() {
            match self.stop_service(managed) {
                Ok(true) => report.stopped_services.push(managed.id().to_string()),
                Ok(false) => {}
                Err(cause) => return Err(report.interrupted(cause)),
            }
        }
        Ok(report.stopped_services)
    }

    /// Start services in order; with `only`, just those ids
    pub fn start_services(
        &mut self,
        resources: &[ManagedResource],
        only: Option<&[String]>,
    ) -> anyhow::Result<Vec<String>> {
        let mut started = Vec::new();
        for managed in resources {
            if only.is_some_and(|ids| !ids.iter().any(|id| id == managed.id())) {
                continue;
            }
            if self.ensure_running(managed)? {
                started.push(managed.id().to_string());
            }
        }
        Ok(started)
    }

    /// Best-effort stop of every service, last resource first.
    ///
    /// Returns how many services are known to be stopped afterwards.
    pub fn force_stop_all(&mut self, resources: &[ManagedResource]) -> usize {
        let ctx = self.ctx;
        let mut count = 0;
        for managed in resources.iter().rev() {
            let Some(service) = managed.service() else {
                continue;
            };
            // Unknown counts as running
            if !service.is_running(ctx).unwrap_or(true) {
                continue;
            }
            if service.force_stop(ctx) {
                count += 1;
                self.record(
                    managed.id(),
                    ResourceState::Stopped,
                    ResourceEvent::ServiceStopped {
                        resource_id: managed.id().to_string(),
                        forced: true,
                    },
                );
            }
        }
        count
    }

    /// Stop services, then uninstall every installed resource in reverse order.
    ///
    /// On failure the report lists what was stopped and uninstalled so far.
    pub fn uninstall(
        &mut self,
        resources: &[ManagedResource],
        backup_dir: &Path,
        compress: bool,
    ) -> Result<MaintenanceReport, Interrupted> {
        let ctx = self.ctx;
        let mut report = MaintenanceReport {
            stopped_services: self.stop_services(resources)?,
            ..MaintenanceReport::default()
        };

        for managed in resources.iter().rev() {
            let id = managed.id().to_string();
            let installed = match managed.manager.is_installed(ctx) {
                Ok(installed) => installed,
                Err(e) => return Err(report.interrupted(driver_error(&e, &id, "is_installed"))),
            };
            if !installed {
                debug!("{} is not installed; nothing to uninstall", id);
                continue;
            }

            info!("Uninstalling {}", id);
            if let Err(e) = managed.manager.uninstall(ctx, backup_dir, false, compress) {
                return Err(report.interrupted(driver_error(&e, &id, "uninstall")));
            }
            self.record(
                &id,
                ResourceState::Uninstalled,
                ResourceEvent::UninstallCompleted {
                    resource_id: id.clone(),
                    incomplete_install: false,
                },
            );
            report.processed.push(id);
        }
        Ok(report)
    }

    /// Stop services, then back up every resource in reverse order
    pub fn backup(
        &mut self,
        resources: &[ManagedResource],
        backup_dir: &Path,
        compress: bool,
    ) -> Result<MaintenanceReport, Interrupted> {
        let ctx = self.ctx;
        let mut report = MaintenanceReport {
            stopped_services: self.stop_services(resources)?,
            ..MaintenanceReport::default()
        };

        for managed in resources.iter().rev() {
            let id = managed.id().to_string();
            debug!("Backing up {}", id);
            if let Err(e) = managed.manager.backup(ctx, backup_dir, compress) {
                return Err(report.interrupted(driver_error(&e, &id, "backup")));
            }
            self.record(
                &id,
                ResourceState::BackedUp,
                ResourceEvent::BackupCompleted {
                    resource_id: id.clone(),
                    backup_dir: backup_dir.display().to_string(),
                },
            );
            report.processed.push(id);
        }
        Ok(report)
    }

    /// Restore resources from `backup_dir` in order, then start their services.
    ///
    /// With `only`, just those ids are restored and started.
    pub fn restore(
        &mut self,
        resources: &[ManagedResource],
        backup_dir: &Path,
        only: Option<&[String]>,
    ) -> anyhow::Result<MaintenanceReport> {
        let ctx = self.ctx;
        let mut report = MaintenanceReport::default();

        for managed in resources {
            if only.is_some_and(|ids| !ids.iter().any(|id| id == managed.id())) {
                continue;
            }
            let id = managed.id().to_string();
            info!("Restoring {}", id);
            managed
                .manager
                .restore(ctx, backup_dir, &managed.package)
                .map_err(|e| driver_error(&e, &id, "restore"))?;
            self.record(
                &id,
                ResourceState::Restored,
                ResourceEvent::RestoreCompleted {
                    resource_id: id.clone(),
                    backup_dir: backup_dir.display().to_string(),
                },
            );
            report.processed.push(id);
        }

        if !ctx.dry_run {
            self.start_services(resources, only)?;
        }
        Ok(report)
    }
}
