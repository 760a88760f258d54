//! Encrypted password repository for Engage
//!
//! Credentials (sudo passwords, database passwords) are kept in a single
//! ChaCha20-Poly1305 blob whose key is derived from a master password and a
//! per-repository random salt with Argon2.
//!
//! # Example
//!
//! ```no_run
//! use engage_secrets::{PasswordRepository, SecureString};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), engage_secrets::SecretsError> {
//! let master = SecureString::from("correct horse");
//! let mut repo = PasswordRepository::new(&master)?;
//! repo.update_key("Engage/alice/sudo_password", "hunter2");
//! repo.save_to_file(Path::new("pw_repository"), Path::new("pw_salt"))?;
//!
//! let repo = PasswordRepository::load_from_file(
//!     Path::new("pw_repository"),
//!     Path::new("pw_salt"),
//!     &master,
//! )?;
//! assert_eq!(repo.get_value("Engage/alice/sudo_password")?.as_str(), "hunter2");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod master;
pub mod provider;
pub mod repository;
pub mod security;

pub use error::{SecretsError, SecretsResult};
pub use master::{resolve_master_password, MasterPasswordSource, MASTER_PASSWORD_ENV};
pub use provider::{PasswordProvider, DRY_RUN_PASSWORD};
pub use repository::{sudo_password_key, PasswordRepository};
pub use security::{RepositoryAccess, SecureString};
