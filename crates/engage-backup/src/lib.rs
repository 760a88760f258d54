//! Engage Backup System
//!
//! This crate captures and restores the on-disk state of installed resources.
//! A resource nominates the absolute paths that make up its persistent state;
//! the [`BackupStore`] writes them into a tar archive (optionally gzip
//! compressed) with paths stored relative to the filesystem root, and restores
//! them back to their original locations.
//!
//! # Features
//!
//! - **Copy-then-delete moves**: originals are removed only after the archive
//!   has been written, synced and re-read
//! - **Privilege awareness**: ownership mismatches are detected before a save
//!   or restore and the operation is re-run as an elevated helper process
//! - **Helper manifests**: the elevated helper receives its file list through a
//!   0600 temporary JSON file, never on the command line
//! - **Backup records**: a per-directory index of archives with SHA256 checksums
//!
//! # Examples
//!
//! ```no_run
//! use engage_backup::BackupStore;
//! use std::path::{Path, PathBuf};
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = BackupStore::new().with_compression(true);
//!     let files = vec![PathBuf::from("/etc/myapp"), PathBuf::from("/var/lib/myapp/data.db")];
//!
//!     store.save(&files, Path::new("/backups/myapp.tgz"), false)?;
//!     store.restore(Path::new("/backups/myapp.tgz"), false)?;
//!     Ok(())
//! }
//! ```

pub mod compression;
pub mod error;
pub mod manifest;
pub mod privilege;
pub mod record;
pub mod store;

// Re-export commonly used types
pub use compression::{calculate_checksum, is_gzip_file, DEFAULT_COMPRESSION_LEVEL};
pub use error::BackupError;
pub use manifest::{HelperManifest, HelperOperation};
pub use privilege::{
    check_if_restore_requires_superuser, check_if_save_requires_superuser, ElevatedRunner,
    PrivilegedBackupStore,
};
pub use record::{BackupIndex, BackupRecord};
pub use store::{ArchiveEntry, BackupStore, SaveOptions, SaveResult};

/// Version of the backup system.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
