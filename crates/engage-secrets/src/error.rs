//! Error types for the password repository

use engage_core::user_error::{ErrorCategory, ErrorDefinition, UserError};
use thiserror::Error;

pub type SecretsResult<T> = std::result::Result<T, SecretsError>;

#[derive(Error, Debug)]
pub enum SecretsError {
    /// Authenticated decryption failed: the master password does not match
    #[error("Master password is incorrect for repository {path}")]
    WrongMasterPassword { path: String },

    /// The file is truncated, has a bad header, or decrypts to invalid data
    #[error("Password repository {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Password repository has no entry for key '{key}'")]
    KeyNotFound { key: String },

    #[error("No master password available and a password was requested for '{key}'")]
    MasterPasswordRequired { key: String },

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Codes owned by engage-secrets
pub mod codes {
    use super::{ErrorCategory, ErrorDefinition};

    pub const MASTER_PASSWORD_INCORRECT: ErrorDefinition = ErrorDefinition::new(
        501,
        "secrets",
        ErrorCategory::UserConfiguration,
        "The master password does not unlock the password repository at {path}",
    );

    pub const PASSWORD_KEY_MISSING: ErrorDefinition = ErrorDefinition::new(
        502,
        "secrets",
        ErrorCategory::UserConfiguration,
        "Password repository has no entry for '{key}'",
    );

    pub const REPOSITORY_UNREADABLE: ErrorDefinition = ErrorDefinition::new(
        503,
        "secrets",
        ErrorCategory::Environment,
        "Password repository could not be read or written: {reason}",
    );

    pub const MASTER_PASSWORD_REQUIRED: ErrorDefinition = ErrorDefinition::new(
        504,
        "secrets",
        ErrorCategory::UserConfiguration,
        "A password was requested for '{key}' but no master password was provided",
    );
}

impl SecretsError {
    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_wrong_password(&self) -> bool {
        matches!(self, SecretsError::WrongMasterPassword { .. })
    }

    /// Structured form for the operator
    pub fn to_user_error(&self) -> UserError {
        match self {
            SecretsError::WrongMasterPassword { path } => {
                UserError::new(&codes::MASTER_PASSWORD_INCORRECT).arg("path", path)
            }
            SecretsError::KeyNotFound { key } => {
                UserError::new(&codes::PASSWORD_KEY_MISSING).arg("key", key)
            }
            SecretsError::MasterPasswordRequired { key } => {
                UserError::new(&codes::MASTER_PASSWORD_REQUIRED).arg("key", key)
            }
            other => UserError::new(&codes::REPOSITORY_UNREADABLE).arg("reason", other),
        }
    }
}
