//! Password lookup as seen by drivers

use crate::error::{SecretsError, SecretsResult};
use crate::repository::PasswordRepository;
use crate::security::SecureString;

/// Value handed out for every lookup in dry-run mode
pub const DRY_RUN_PASSWORD: &str = "engage-dry-run-password";

/// Where driver password lookups are answered from
#[derive(Debug)]
pub enum PasswordProvider {
    /// A real, unlocked repository
    Repository(PasswordRepository),
    /// Dry-run: every key resolves to [`DRY_RUN_PASSWORD`]
    DryRun,
    /// No master password was supplied
    Unavailable,
}

impl PasswordProvider {
    /// Look up `key`
    pub fn password(&self, key: &str) -> SecretsResult<SecureString> {
        match self {
            PasswordProvider::Repository(repo) => repo.get_value(key).cloned(),
            PasswordProvider::DryRun => Ok(SecureString::from(DRY_RUN_PASSWORD)),
            PasswordProvider::Unavailable => Err(SecretsError::MasterPasswordRequired {
                key: key.to_string(),
            }),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, PasswordProvider::DryRun)
    }

    pub fn repository(&self) -> Option<&PasswordRepository> {
        match self {
            PasswordProvider::Repository(repo) => Some(repo),
            _ => None,
        }
    }

    pub fn repository_mut(&mut self) -> Option<&mut PasswordRepository> {
        match self {
            PasswordProvider::Repository(repo) => Some(repo),
            _ => None,
        }
    }
}
