//! Engage CLI - resource deployment engine
//!
//! Installs, upgrades, backs up and restores the resources of a deployment,
//! rolling back when a step fails.

mod cli;
mod commands;
mod output;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;
use engage_core::{DeploymentHome, EngineSettings, ErrorFile, UserError};
use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands, GlobalArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let global = cli.global.clone();
    let home = commands::resolve_home(&global).ok();

    // The elevated helper runs as root and must not create root-owned log files
    let log_home = match cli.command {
        Commands::BackupHelper(_) => None,
        _ => home.as_ref(),
    };
    init_tracing(&global, log_home);

    match dispatch(cli.command, &global) {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<UserError>() {
            Some(user) => {
                report_user_error(user, &global, home.as_ref());
                std::process::exit(1);
            }
            None => Err(err),
        },
    }
}

fn dispatch(command: Commands, global: &GlobalArgs) -> Result<()> {
    match command {
        Commands::Install(args) => commands::install::install(args, global),
        Commands::Upgrade(args) => commands::install::upgrade(args, global),
        Commands::Backup(args) => commands::maintenance::backup(args, global),
        Commands::Uninstall(args) => commands::maintenance::uninstall(args, global),
        Commands::Restore(args) => commands::maintenance::restore(args, global),
        Commands::RestoreEngage(args) => commands::maintenance::restore_engage(args, global),
        Commands::Plan(args) => commands::plan::run(args),
        Commands::History(args) => commands::history::run(args, global),
        Commands::Password(command) => commands::password::run(command, global),
        Commands::BackupHelper(args) => commands::helper::run(args),
    }
}

/// Log the error, write the error file and print it for the operator
fn report_user_error(user: &UserError, global: &GlobalArgs, home: Option<&DeploymentHome>) {
    error!("{}", user);
    if let Some(path) = error_file_path(global, home) {
        match ErrorFile::write(&path, user) {
            Ok(()) => tracing::debug!("Wrote error file {}", path.display()),
            Err(e) => error!("Could not write error file {}: {}", path.display(), e),
        }
    }

    output::error(&user.to_string());
    if let Some(original) = &user.original_error {
        output::kv("Cause", &original.to_string());
    }
    if let Some(rollback) = &user.rollback_error {
        output::kv("Rollback error", &rollback.to_string());
    }
}

fn error_file_path(global: &GlobalArgs, home: Option<&DeploymentHome>) -> Option<PathBuf> {
    if let Some(path) = &global.error_file {
        return Some(path.clone().into_std_path_buf());
    }
    let home = home?;
    let settings = EngineSettings::load(&home.settings_file()).unwrap_or_default();
    Some(home.error_file(&settings))
}

/// Console level from `--log`, else `-v`/`-q`; `RUST_LOG` overrides both
fn console_filter(global: &GlobalArgs) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match &global.log {
        Some(level) => level.as_str(),
        None if global.quiet => "error",
        None => match global.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        },
    };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing: a console layer plus a debug log file when the home exists
fn init_tracing(global: &GlobalArgs, home: Option<&DeploymentHome>) {
    let file_layer = home
        .filter(|home| home.root().is_dir())
        .and_then(|home| {
            std::fs::create_dir_all(home.log_dir()).ok()?;
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(home.log_file())
                .ok()
        })
        .map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::DEBUG)
        });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter(global)),
        )
        .with(file_layer)
        .init();
}
