//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Engage - install, upgrade, back up and restore a deployment
#[derive(Parser, Debug)]
#[command(name = "engage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Deployment home directory (default: ~/.engage)
    #[arg(long, env = "ENGAGE_HOME", global = true)]
    pub deployment_home: Option<Utf8PathBuf>,

    /// File holding the master password for the password repository
    #[arg(long, global = true)]
    pub master_password_file: Option<Utf8PathBuf>,

    /// Validate and log every step without changing the system
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Force-stop every managed service if the run fails
    #[arg(long, global = true)]
    pub force_stop_on_error: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Where to write the structured error on failure
    #[arg(long, global = true)]
    pub error_file: Option<Utf8PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install a resource list
    Install(InstallArgs),

    /// Replace the installed resources with a new list, rolling back on failure
    Upgrade(UpgradeArgs),

    /// Back up every installed resource and the deployment configuration
    Backup(DirArgs),

    /// Stop and remove every installed resource
    Uninstall(UninstallArgs),

    /// Restore resources from a backup directory
    Restore(DirArgs),

    /// Restore the deployment configuration from a backup directory
    RestoreEngage(RestoreEngageArgs),

    /// Show the install order and host partitions of a resource list
    Plan(PlanArgs),

    /// Show recorded lifecycle events
    History(HistoryArgs),

    /// Manage the password repository
    #[command(subcommand)]
    Password(PasswordCommands),

    /// Run a backup manifest with elevated privileges
    #[command(hide = true)]
    BackupHelper(BackupHelperArgs),
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Resource list (JSON)
    pub resources: Utf8PathBuf,

    /// Only install resources on this host
    #[arg(long, value_name = "ID")]
    pub node: Option<String>,

    /// Leave installed resources in place when a later one fails
    #[arg(long)]
    pub no_rollback: bool,
}

#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// New resource list (JSON)
    pub resources: Utf8PathBuf,

    /// Directory that receives the previous installation
    pub backup_dir: Utf8PathBuf,
}

#[derive(Args, Debug)]
pub struct DirArgs {
    /// Backup directory
    pub dir: Utf8PathBuf,

    /// Only handle resources on this host
    #[arg(long, value_name = "ID")]
    pub node: Option<String>,
}

#[derive(Args, Debug)]
pub struct RestoreEngageArgs {
    /// Backup directory holding engage-home.tgz or engage-home.tar
    pub dir: Utf8PathBuf,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Only uninstall resources on this host
    #[arg(long, value_name = "ID")]
    pub node: Option<String>,

    /// Directory that receives resource state (default: <home>/uninstalled)
    #[arg(long)]
    pub backup_dir: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Resource list (JSON)
    pub resources: Utf8PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Only events for this resource
    #[arg(long)]
    pub resource: Option<String>,

    /// Number of most recent events to show
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Subcommand, Debug)]
pub enum PasswordCommands {
    /// Create an empty password repository
    Init(PasswordInitArgs),

    /// Store a value read from stdin under KEY
    Set(PasswordSetArgs),

    /// List stored keys
    List,
}

#[derive(Args, Debug)]
pub struct PasswordInitArgs {
    /// Also write the master password to config/master.pw (mode 0600)
    #[arg(long)]
    pub save_master_password: bool,

    /// Replace an existing repository
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct PasswordSetArgs {
    /// Key, e.g. Engage/<user>/sudo_password
    pub key: String,
}

#[derive(Args, Debug)]
pub struct BackupHelperArgs {
    /// JSON manifest written by the parent process
    #[arg(long)]
    pub manifest: Utf8PathBuf,
}
