//! Master password sources

use engage_core::utils::write_atomic;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::SecretsResult;
use crate::security::SecureString;

/// Environment variable consulted when no master password file is given
pub const MASTER_PASSWORD_ENV: &str = "ENGAGE_MASTER_PASSWORD";

/// Where a master password came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterPasswordSource {
    File(PathBuf),
    Environment,
}

/// Read a master password file, dropping the trailing newline
pub fn read_master_password_file(path: &Path) -> SecretsResult<SecureString> {
    let content = fs::read_to_string(path)?;
    let trimmed = content.trim_end_matches(['\r', '\n']).to_string();
    Ok(SecureString::new(trimmed))
}

/// Write a master password file readable only by the owner
pub fn write_master_password_file(path: &Path, password: &SecureString) -> SecretsResult<()> {
    write_atomic(path, password.as_bytes(), Some(0o600))?;
    debug!("Wrote master password file {}", path.display());
    Ok(())
}

/// Resolve the master password.
///
/// Order: the explicit file, the deployment's default file, then
/// `ENGAGE_MASTER_PASSWORD`. Returns `None` when no source is available.
pub fn resolve_master_password(
    explicit_file: Option<&Path>,
    default_file: &Path,
) -> SecretsResult<Option<(SecureString, MasterPasswordSource)>> {
    if let Some(path) = explicit_file {
        let pw = read_master_password_file(path)?;
        return Ok(Some((pw, MasterPasswordSource::File(path.to_path_buf()))));
    }

    if default_file.exists() {
        let pw = read_master_password_file(default_file)?;
        return Ok(Some((
            pw,
            MasterPasswordSource::File(default_file.to_path_buf()),
        )));
    }

    match std::env::var(MASTER_PASSWORD_ENV) {
        Ok(value) if !value.is_empty() => Ok(Some((
            SecureString::new(value),
            MasterPasswordSource::Environment,
        ))),
        _ => Ok(None),
    }
}
