//! Per-run context handed to every driver call

use std::path::{Path, PathBuf};

use engage_backup::{BackupStore, ElevatedRunner, PrivilegedBackupStore};
use engage_core::poll::PollPolicy;
use engage_core::{DeploymentHome, EngineSettings};
use engage_secrets::{sudo_password_key, PasswordProvider, SecureString};
use tracing::info;

use crate::exec::{display_command, CommandOutput};
use crate::sudo::{current_user, is_superuser, SudoRunner};

/// Everything a driver may consult: deployment paths, settings, dry-run mode,
/// the password provider and the sudo runner.
#[derive(Debug)]
pub struct InstallContext {
    pub home: DeploymentHome,
    pub settings: EngineSettings,
    pub dry_run: bool,
    passwords: PasswordProvider,
    sudo: SudoRunner,
    user: String,
}

impl InstallContext {
    pub fn new(home: DeploymentHome, settings: EngineSettings) -> Self {
        let sudo = SudoRunner::new(settings.sudo.program.clone());
        Self {
            home,
            settings,
            dry_run: false,
            passwords: PasswordProvider::Unavailable,
            sudo,
            user: current_user(),
        }
    }

    /// Dry-run mode also answers every password lookup with a placeholder
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        if dry_run {
            self.passwords = PasswordProvider::DryRun;
        }
        self
    }

    pub fn with_passwords(mut self, passwords: PasswordProvider) -> Self {
        if !self.dry_run {
            self.passwords = passwords;
        }
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn passwords(&self) -> &PasswordProvider {
        &self.passwords
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.settings.poll.into()
    }

    /// Look up a password, reporting failures as structured errors
    pub fn password(&self, key: &str) -> anyhow::Result<SecureString> {
        self.passwords
            .password(key)
            .map_err(|e| e.to_user_error().into())
    }

    /// The current user's sudo password, if the repository holds one
    pub fn sudo_password(&self) -> Option<SecureString> {
        self.passwords.password(&sudo_password_key(&self.user)).ok()
    }

    /// Run `program args...` as root. In dry-run mode the command is only logged.
    pub fn run_elevated(&self, program: &str, args: &[String]) -> anyhow::Result<CommandOutput> {
        if self.dry_run {
            info!("[dry-run] Would run as superuser: {}", display_command(program, args));
            return Ok(CommandOutput {
                status: Some(0),
                ..CommandOutput::default()
            });
        }
        let password = if is_superuser() {
            None
        } else {
            self.sudo_password()
        };
        self.sudo.run(program, args, password.as_ref())
    }

    /// Program that runs `backup-helper` when a backup needs root
    pub fn helper_program(&self) -> anyhow::Result<PathBuf> {
        match &self.settings.helper_program {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_exe()?),
        }
    }

    /// Backup store rooted at `/` that escalates through sudo when needed
    pub fn privileged_backup_store(&self, compress: bool) -> anyhow::Result<PrivilegedBackupStore<'_>> {
        let store = BackupStore::new().with_compression(compress);
        Ok(PrivilegedBackupStore::new(store, self, self.helper_program()?))
    }
}

impl ElevatedRunner for InstallContext {
    fn run_elevated(&self, program: &Path, args: &[String]) -> anyhow::Result<()> {
        InstallContext::run_elevated(self, &program.to_string_lossy(), args).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_secrets::{PasswordRepository, DRY_RUN_PASSWORD};
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> InstallContext {
        InstallContext::new(DeploymentHome::new(temp.path()), EngineSettings::default())
    }

    #[test]
    fn test_dry_run_uses_placeholder_passwords() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp).with_dry_run(true);
        assert_eq!(ctx.password("Engage/x/sudo_password").unwrap().as_str(), DRY_RUN_PASSWORD);

        let output = ctx.run_elevated("rm", &["-rf".to_string(), "/".to_string()]).unwrap();
        assert!(output.success());
    }

    #[test]
    fn test_password_errors_are_structured() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let err = ctx.password("db/admin").unwrap_err();
        let user = err.downcast_ref::<engage_core::UserError>().unwrap();
        assert!(user.is(&engage_secrets::error::codes::MASTER_PASSWORD_REQUIRED));
    }

    #[test]
    fn test_sudo_password_uses_user_key() {
        let temp = TempDir::new().unwrap();
        let mut repo = PasswordRepository::new(&SecureString::from("master")).unwrap();
        repo.update_key(&sudo_password_key("alice"), "s3cret");
        let ctx = context(&temp)
            .with_user("alice")
            .with_passwords(PasswordProvider::Repository(repo));

        assert_eq!(ctx.sudo_password().unwrap().as_str(), "s3cret");
    }
}
