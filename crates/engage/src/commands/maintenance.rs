//! Backup, uninstall and restore commands

use anyhow::Result;
use engage_install::{BackupEngine, RestoreEngine, UninstallEngine};

use super::{absolute, Session};
use crate::cli::{DirArgs, GlobalArgs, RestoreEngageArgs, UninstallArgs};
use crate::output;

/// Default uninstall target under the deployment home
const UNINSTALL_DIR: &str = "uninstalled";

pub fn backup(args: DirArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    let dir = absolute(args.dir.as_std_path())?;

    let ids = output::with_spinner(format!("Backing up to {}...", dir.display()), || {
        BackupEngine::new(&session.ctx, &session.registry)
            .with_options(session.options(args.node))
            .run(&dir)
    })?;
    output::run_summary(
        &format!("Backed up {} resources to {}", ids.len(), dir.display()),
        &ids,
        global.dry_run,
    );
    Ok(())
}

pub fn uninstall(args: UninstallArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    let dir = match args.backup_dir {
        Some(dir) => absolute(dir.as_std_path())?,
        None => session.ctx.home.root().join(UNINSTALL_DIR),
    };

    let ids = output::with_spinner("Uninstalling resources...", || {
        UninstallEngine::new(&session.ctx, &session.registry)
            .with_options(session.options(args.node))
            .run(&dir)
    })?;
    if ids.is_empty() {
        output::info("Nothing is installed");
        return Ok(());
    }
    output::run_summary(&format!("Uninstalled {} resources", ids.len()), &ids, global.dry_run);
    output::kv("Saved state", &dir.display().to_string());
    Ok(())
}

pub fn restore(args: DirArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    let dir = absolute(args.dir.as_std_path())?;

    let ids = output::with_spinner(format!("Restoring from {}...", dir.display()), || {
        RestoreEngine::new(&session.ctx, &session.registry)
            .with_options(session.options(args.node))
            .restore(&dir)
    })?;
    output::run_summary(&format!("Restored {} resources", ids.len()), &ids, global.dry_run);
    Ok(())
}

pub fn restore_engage(args: RestoreEngageArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    let dir = absolute(args.dir.as_std_path())?;

    let archive = RestoreEngine::new(&session.ctx, &session.registry).restore_engage(&dir)?;
    output::success("Restored deployment configuration");
    output::kv("Archive", &archive.display().to_string());
    output::kv("Deployment home", &session.ctx.home.root().display().to_string());
    Ok(())
}
