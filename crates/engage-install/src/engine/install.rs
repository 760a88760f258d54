use engage_core::types::Resource;
use tracing::info;

use super::{EngineOptions, Runtime};
use crate::context::InstallContext;
use crate::registry::DriverRegistry;
use crate::sequencer::InstallOptions;

/// Installs a resource list and records it as installed
pub struct InstallEngine<'a> {
    runtime: Runtime<'a>,
}

impl<'a> InstallEngine<'a> {
    pub fn new(ctx: &'a InstallContext, registry: &'a DriverRegistry) -> Self {
        Self {
            runtime: Runtime::new(ctx, registry),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.runtime.options = options;
        self
    }

    /// Install `resources`; returns the ids in install order.
    ///
    /// With a node, only that host's partition is installed and merged into
    /// the database.
    pub fn run(&self, resources: Vec<Resource>) -> anyhow::Result<Vec<String>> {
        let runtime = &self.runtime;
        let plan = runtime.plan(resources.clone(), true)?;
        let managed = runtime.instantiate(&plan)?;
        info!("Installing {} resources", managed.len());

        let mut sequencer = runtime.sequencer();
        let options = InstallOptions {
            rollback_on_failure: runtime.options.rollback_on_failure,
        };

        let outcome = match sequencer.install(&managed, options) {
            Ok(outcome) => outcome,
            Err(e) => {
                runtime.after_failure(&mut sequencer, &managed);
                return Err(e);
            }
        };

        match outcome.into_install_result() {
            Ok(ids) => {
                let mut db = runtime.load_database()?;
                runtime.update_database(&mut db, &[], runtime.recorded(&plan, &resources))?;
                info!("Installed {} resources", ids.len());
                Ok(ids)
            }
            Err(err) => {
                runtime.after_failure(&mut sequencer, &managed);
                Err(err.into())
            }
        }
    }
}
