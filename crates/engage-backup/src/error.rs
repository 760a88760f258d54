//! Backup error types

use engage_core::user_error::{ErrorCategory, ErrorDefinition};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Path {path} is not under the backup root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Path {0} does not exist")]
    MissingPath(PathBuf),

    #[error("Archive {archive} is missing entries after write: {missing:?}")]
    VerificationFailed {
        archive: PathBuf,
        missing: Vec<String>,
    },

    #[error("Archive {0} does not exist")]
    ArchiveNotFound(PathBuf),

    #[error("Elevated {operation} failed: {reason}")]
    ElevationFailed { operation: String, reason: String },
}

/// Codes owned by engage-backup
pub mod codes {
    use super::{ErrorCategory, ErrorDefinition};

    pub const BACKUP_FAILED: ErrorDefinition = ErrorDefinition::new(
        601,
        "backup",
        ErrorCategory::Execution,
        "Backup of resource {id} to {archive} failed: {reason}",
    );

    pub const RESTORE_FAILED: ErrorDefinition = ErrorDefinition::new(
        602,
        "backup",
        ErrorCategory::Execution,
        "Restore of resource {id} from {archive} failed: {reason}",
    );

    pub const SUPERUSER_REQUIRED: ErrorDefinition = ErrorDefinition::new(
        603,
        "backup",
        ErrorCategory::Environment,
        "{operation} of {target} requires superuser access: {reason}",
    );

    pub const BACKUP_MISSING: ErrorDefinition = ErrorDefinition::new(
        604,
        "backup",
        ErrorCategory::UserConfiguration,
        "No backup of resource {id} found in {dir}",
    );
}
