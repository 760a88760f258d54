//! Install and upgrade commands

use anyhow::Result;
use engage_install::{InstallEngine, UpgradeEngine};

use super::{absolute, read_resources, Session};
use crate::cli::{GlobalArgs, InstallArgs, UpgradeArgs};
use crate::output;

pub fn install(args: InstallArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    let resources = read_resources(args.resources.as_std_path())?;

    let mut options = session.options(args.node);
    options.rollback_on_failure = !args.no_rollback;

    let ids = output::with_spinner(format!("Installing {} resources...", resources.len()), || {
        InstallEngine::new(&session.ctx, &session.registry)
            .with_options(options)
            .run(resources)
    })?;

    let headline = if global.dry_run {
        format!("{} resources checked, nothing changed", ids.len())
    } else {
        format!("Installed {} resources", ids.len())
    };
    output::run_summary(&headline, &ids, global.dry_run);
    Ok(())
}

pub fn upgrade(args: UpgradeArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    let resources = read_resources(args.resources.as_std_path())?;
    let backup_dir = absolute(args.backup_dir.as_std_path())?;

    output::kv("Backup directory", &backup_dir.display().to_string());
    let ids = output::with_spinner("Upgrading installation...", || {
        UpgradeEngine::new(&session.ctx, &session.registry)
            .with_options(session.options(None))
            .with_backup_dir(&backup_dir)
            .run(resources)
    })?;

    let headline = if global.dry_run {
        format!("upgrade of {} resources checked", ids.len())
    } else {
        format!("Upgraded to {} resources", ids.len())
    };
    output::run_summary(&headline, &ids, global.dry_run);
    Ok(())
}
