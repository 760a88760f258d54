//! Superuser detection and elevated re-invocation.
//!
//! Resource state is often owned by another account (root-owned config under
//! `/etc`, a service user's data directory). Before a save or restore the
//! store checks whether the current user can do the job; if not, the work is
//! re-run by an elevated helper process that reads a [`HelperManifest`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::manifest::HelperManifest;
use crate::store::{BackupStore, SaveOptions, SaveResult};

/// Runs a program with superuser rights.
///
/// Implemented by the sudo runner; the password never appears in `args`.
pub trait ElevatedRunner {
    fn run_elevated(&self, program: &Path, args: &[String]) -> anyhow::Result<()>;
}

#[cfg(unix)]
fn effective_uid() -> u32 {
    nix::unistd::geteuid().as_raw()
}

#[cfg(unix)]
pub(crate) fn running_as_superuser() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
pub(crate) fn running_as_superuser() -> bool {
    false
}

#[cfg(unix)]
fn owned_by_other(metadata: &fs::Metadata, uid: u32) -> bool {
    use std::os::unix::fs::MetadataExt;
    metadata.uid() != uid
}

fn unreadable(path: &Path, metadata: &fs::Metadata) -> bool {
    let result = if metadata.is_dir() {
        fs::read_dir(path).map(|_| ())
    } else if metadata.is_file() {
        fs::File::open(path).map(|_| ())
    } else {
        Ok(())
    };
    matches!(result, Err(e) if e.kind() == io::ErrorKind::PermissionDenied)
}

/// True if saving `files` needs superuser rights: some path (or anything
/// beneath a directory) is owned by another user or cannot be read.
#[cfg(unix)]
pub fn check_if_save_requires_superuser(files: &[PathBuf]) -> bool {
    if running_as_superuser() {
        return false;
    }
    let uid = effective_uid();

    for path in files {
        if fs::symlink_metadata(path).is_err() {
            continue;
        }
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Cannot walk {}: {}", path.display(), e);
                    return true;
                }
            };
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => return true,
            };
            if owned_by_other(&metadata, uid) || unreadable(entry.path(), &metadata) {
                debug!("{} requires superuser access", entry.path().display());
                return true;
            }
        }
    }
    false
}

#[cfg(not(unix))]
pub fn check_if_save_requires_superuser(_files: &[PathBuf]) -> bool {
    false
}

/// True if restoring `archive` needs superuser rights: some entry belongs
/// to another user, or an existing target is owned by another user.
#[cfg(unix)]
pub fn check_if_restore_requires_superuser(
    store: &BackupStore,
    archive: &Path,
) -> anyhow::Result<bool> {
    if running_as_superuser() {
        return Ok(false);
    }
    let uid = effective_uid();

    for entry in store.list_entries(archive)? {
        if entry.uid != u64::from(uid) {
            debug!(
                "Archive entry {} is owned by uid {}",
                entry.path.display(),
                entry.uid
            );
            return Ok(true);
        }
        let target = store.root().join(&entry.path);
        if let Ok(metadata) = fs::symlink_metadata(&target) {
            if owned_by_other(&metadata, uid) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[cfg(not(unix))]
pub fn check_if_restore_requires_superuser(
    _store: &BackupStore,
    _archive: &Path,
) -> anyhow::Result<bool> {
    Ok(false)
}

/// A [`BackupStore`] that escalates through an [`ElevatedRunner`] when the
/// current user lacks access.
pub struct PrivilegedBackupStore<'a> {
    store: BackupStore,
    runner: &'a dyn ElevatedRunner,
    helper_program: PathBuf,
}

impl<'a> PrivilegedBackupStore<'a> {
    /// `helper_program` must accept `backup-helper --manifest <file>`.
    pub fn new(store: BackupStore, runner: &'a dyn ElevatedRunner, helper_program: PathBuf) -> Self {
        Self {
            store,
            runner,
            helper_program,
        }
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    pub fn save(&self, files: &[PathBuf], archive: &Path, options: SaveOptions) -> anyhow::Result<Option<SaveResult>> {
        if !check_if_save_requires_superuser(files) {
            return self.store.save_with(files, archive, options).map(Some);
        }

        info!("Saving {} as superuser", archive.display());
        let manifest = HelperManifest::save(&self.store, files, archive, options);
        self.run_helper(&manifest)?;
        Ok(None)
    }

    pub fn restore(&self, archive: &Path, move_archive: bool) -> anyhow::Result<()> {
        if !check_if_restore_requires_superuser(&self.store, archive)? {
            self.store.restore(archive, move_archive)?;
            return Ok(());
        }

        info!("Restoring {} as superuser", archive.display());
        let manifest = HelperManifest::restore(&self.store, archive, move_archive);
        self.run_helper(&manifest)
    }

    fn run_helper(&self, manifest: &HelperManifest) -> anyhow::Result<()> {
        let file = manifest.write_temp()?;
        let args = vec![
            "backup-helper".to_string(),
            "--manifest".to_string(),
            file.path().display().to_string(),
        ];
        self.runner.run_elevated(&self.helper_program, &args)
    }
}
