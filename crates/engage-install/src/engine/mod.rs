//! Top-level runs
//!
//! Each engine loads what it needs from the deployment home (the installed
//! resource database, the driver registry it is given), drives an
//! [`InstallSequencer`] and writes the database back when the run changed
//! what is installed. Dry runs never write the database.

mod install;
mod maintenance;
mod upgrade;

pub use install::InstallEngine;
pub use maintenance::{BackupEngine, RestoreEngine, UninstallEngine};
pub use upgrade::UpgradeEngine;

use engage_core::types::Resource;
use engage_core::user_error::codes;
use engage_core::{InstalledResourceDatabase, UserError};
use tracing::{debug, info, warn};

use crate::context::InstallContext;
use crate::ledger::StatusLedger;
use crate::manager::ManagedResource;
use crate::plan::{InstallPlan, InstallPlanBuilder};
use crate::registry::DriverRegistry;
use crate::sequencer::InstallSequencer;

/// File name of the database copy kept next to resource backups
pub const DATABASE_BACKUP_FILE: &str = "installed_resources.json";

/// Archive stem for the deployment home's config directory
pub const HOME_ARCHIVE_STEM: &str = "engage-home";

/// Switches shared by every engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Restrict the run to resources on this host
    pub node: Option<String>,
    /// Roll back on install failure
    pub rollback_on_failure: bool,
    /// Force-stop every service after an unrecovered failure
    pub force_stop_on_error: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            node: None,
            rollback_on_failure: true,
            force_stop_on_error: false,
        }
    }
}

/// State every engine carries
struct Runtime<'a> {
    ctx: &'a InstallContext,
    registry: &'a DriverRegistry,
    ledger: StatusLedger,
    options: EngineOptions,
}

impl<'a> Runtime<'a> {
    fn new(ctx: &'a InstallContext, registry: &'a DriverRegistry) -> Self {
        Self {
            ctx,
            registry,
            ledger: StatusLedger::new(ctx.home.events_file()),
            options: EngineOptions::default(),
        }
    }

    fn sequencer(&self) -> InstallSequencer<'_> {
        InstallSequencer::new(self.ctx).with_ledger(&self.ledger)
    }

    fn load_database(&self) -> anyhow::Result<InstalledResourceDatabase> {
        let path = self.ctx.home.installed_resources_file();
        InstalledResourceDatabase::load(&path).map_err(|e| {
            UserError::new(&codes::DATABASE_INVALID)
                .arg("path", path.display())
                .arg("reason", &e)
                .into()
        })
    }

    /// Validate and order `resources`, narrowed to the configured node
    fn plan(&self, resources: Vec<Resource>, require_target: bool) -> anyhow::Result<InstallPlan> {
        let mut builder = InstallPlanBuilder::new(resources);
        if !require_target {
            builder = builder.allow_missing_install_target().skip_port_checks();
        }
        let plan = builder.build()?;
        match &self.options.node {
            Some(host) => Ok(plan.for_host(host)?),
            None => Ok(plan),
        }
    }

    fn instantiate(&self, plan: &InstallPlan) -> anyhow::Result<Vec<ManagedResource>> {
        self.registry.instantiate_all(plan.resources())
    }

    /// Order previously installed resources; the database needs no install target
    fn installed(&self, db: &InstalledResourceDatabase) -> anyhow::Result<(InstallPlan, Vec<ManagedResource>)> {
        let plan = self.plan(db.resources().to_vec(), false)?;
        let managed = self.instantiate(&plan)?;
        Ok((plan, managed))
    }

    /// Resources of `plan` as recorded in the database.
    ///
    /// A node plan drops links to other nodes, so its resources are taken
    /// from `source`, the unnarrowed list the plan was built from.
    fn recorded(&self, plan: &InstallPlan, source: &[Resource]) -> Vec<Resource> {
        if self.options.node.is_none() {
            return plan.to_resources();
        }
        plan.order()
            .iter()
            .filter_map(|id| source.iter().find(|r| &r.id == id))
            .cloned()
            .collect()
    }

    /// Write what the run changed to the database.
    ///
    /// A whole-deployment run replaces the database with `installed`. A node
    /// run drops `removed` and merges `installed` by id, leaving the records
    /// of other nodes alone.
    fn update_database(
        &self,
        db: &mut InstalledResourceDatabase,
        removed: &[String],
        installed: Vec<Resource>,
    ) -> anyhow::Result<()> {
        if self.ctx.dry_run {
            info!(
                "[dry-run] Would record {} installed and {} removed resources",
                installed.len(),
                removed.len()
            );
            return Ok(());
        }
        match &self.options.node {
            None => db.replace(installed)?,
            Some(node) => {
                let dropped = db.remove(removed);
                debug!("Node {}: dropped {}, recording {} resources", node, dropped, installed.len());
                db.merge(installed)?;
            }
        }
        db.save()?;
        Ok(())
    }

    /// Apply `force_stop_on_error` after a failed run
    fn after_failure(&self, sequencer: &mut InstallSequencer<'_>, resources: &[ManagedResource]) {
        if self.options.force_stop_on_error {
            let stopped = sequencer.force_stop_all(resources);
            warn!("Force-stopped {} services after failure", stopped);
        }
    }
}
