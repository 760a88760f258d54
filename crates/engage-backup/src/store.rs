//! Archive save and restore.
//!
//! Paths are stored in the archive relative to the store root (`/` in
//! production), so extracting under the same root puts every file back at
//! its original absolute path.

use anyhow::Context;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder as TarBuilder};
use tracing::{debug, info, warn};

use crate::compression::{is_gzip_file, DEFAULT_COMPRESSION_LEVEL};
use crate::error::BackupError;
use crate::privilege::running_as_superuser;

/// Options for [`BackupStore::save_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Delete the originals once the archive is verified
    pub move_files: bool,

    /// Skip paths that do not exist instead of failing
    pub skip_missing: bool,
}

impl SaveOptions {
    pub fn moving(mut self, move_files: bool) -> Self {
        self.move_files = move_files;
        self
    }

    pub fn skipping_missing(mut self, skip_missing: bool) -> Self {
        self.skip_missing = skip_missing;
        self
    }
}

/// Result of a save operation.
#[derive(Debug, Clone)]
pub struct SaveResult {
    pub archive_path: PathBuf,

    /// Top-level paths written to the archive
    pub saved: Vec<PathBuf>,

    /// Paths skipped because they did not exist
    pub skipped: Vec<PathBuf>,

    /// Number of archive entries, including directory contents
    pub entry_count: usize,
}

/// One archive entry, as listed from the tar headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path relative to the store root
    pub path: PathBuf,
    pub uid: u64,
    pub size: u64,
}

/// Tar-based store for resource state.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
    compress: bool,
}

impl Default for BackupStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupStore {
    /// Store rooted at `/`, uncompressed.
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/"),
            compress: false,
        }
    }

    /// Use a different root directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Gzip archives written by `save`.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn compresses(&self) -> bool {
        self.compress
    }

    /// Archive `files` into `archive_path`, deleting the originals afterwards
    /// when `move_files` is set.
    pub fn save(
        &self,
        files: &[PathBuf],
        archive_path: &Path,
        move_files: bool,
    ) -> anyhow::Result<SaveResult> {
        self.save_with(files, archive_path, SaveOptions::default().moving(move_files))
    }

    /// Archive `files` with explicit options.
    pub fn save_with(
        &self,
        files: &[PathBuf],
        archive_path: &Path,
        options: SaveOptions,
    ) -> anyhow::Result<SaveResult> {
        let mut saved = Vec::new();
        let mut skipped = Vec::new();

        for path in files {
            if fs::symlink_metadata(path).is_err() {
                if options.skip_missing {
                    debug!("Skipping missing path {}", path.display());
                    skipped.push(path.clone());
                    continue;
                }
                return Err(BackupError::MissingPath(path.clone()).into());
            }
            saved.push(path.clone());
        }

        if let Some(parent) = archive_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = archive_path.with_extension("partial");
        let entry_count = match self.write_archive(&saved, &tmp_path) {
            Ok(count) => count,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };
        fs::rename(&tmp_path, archive_path).with_context(|| {
            format!("Failed to move archive into place at {}", archive_path.display())
        })?;

        self.verify_archive(archive_path, &saved)?;

        if options.move_files {
            for path in &saved {
                remove_path(path)
                    .with_context(|| format!("Failed to remove {} after backup", path.display()))?;
            }
            debug!("Removed {} original paths after backup", saved.len());
        }

        info!(
            "Saved {} paths ({} entries) to {}",
            saved.len(),
            entry_count,
            archive_path.display()
        );

        Ok(SaveResult {
            archive_path: archive_path.to_path_buf(),
            saved,
            skipped,
            entry_count,
        })
    }

    /// Extract `archive_path` under the store root. Deletes the archive after
    /// success when `move_archive` is set.
    pub fn restore(&self, archive_path: &Path, move_archive: bool) -> anyhow::Result<usize> {
        if !archive_path.exists() {
            return Err(BackupError::ArchiveNotFound(archive_path.to_path_buf()).into());
        }

        let mut archive = Archive::new(self.open_reader(archive_path)?);
        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);
        archive.set_preserve_ownerships(running_as_superuser());
        archive.set_overwrite(true);

        let mut count = 0;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let unpacked = entry
                .unpack_in(&self.root)
                .with_context(|| format!("Failed to extract into {}", self.root.display()))?;
            if !unpacked {
                warn!(
                    "Skipped archive entry outside the restore root: {}",
                    entry.path()?.display()
                );
                continue;
            }
            count += 1;
        }

        if move_archive {
            fs::remove_file(archive_path)?;
        }

        info!(
            "Restored {} entries from {} under {}",
            count,
            archive_path.display(),
            self.root.display()
        );
        Ok(count)
    }

    /// List the entries of an archive.
    pub fn list_entries(&self, archive_path: &Path) -> anyhow::Result<Vec<ArchiveEntry>> {
        let mut archive = Archive::new(self.open_reader(archive_path)?);
        let mut entries = Vec::new();
        for entry in archive.entries()? {
            let entry = entry?;
            let header = entry.header();
            entries.push(ArchiveEntry {
                path: entry.path()?.into_owned(),
                uid: header.uid()?,
                size: header.size()?,
            });
        }
        Ok(entries)
    }

    /// Path inside the archive for an absolute path.
    pub fn archive_name(&self, path: &Path) -> Result<PathBuf, BackupError> {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| BackupError::OutsideRoot {
                path: path.to_path_buf(),
                root: self.root.clone(),
            })
    }

    fn open_reader(&self, archive_path: &Path) -> anyhow::Result<Box<dyn Read>> {
        let file = File::open(archive_path)
            .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
        let reader = BufReader::new(file);
        if is_gzip_file(archive_path)? {
            Ok(Box::new(GzDecoder::new(reader)))
        } else {
            Ok(Box::new(reader))
        }
    }

    fn write_archive(&self, paths: &[PathBuf], archive_path: &Path) -> anyhow::Result<usize> {
        let file = File::create(archive_path)?;

        if self.compress {
            let encoder = GzEncoder::new(file, Compression::new(DEFAULT_COMPRESSION_LEVEL));
            let mut tar = TarBuilder::new(encoder);
            let count = self.append_paths(&mut tar, paths)?;
            let file = tar.into_inner()?.finish()?;
            file.sync_all()?;
            Ok(count)
        } else {
            let mut tar = TarBuilder::new(file);
            let count = self.append_paths(&mut tar, paths)?;
            let file = tar.into_inner()?;
            file.sync_all()?;
            Ok(count)
        }
    }

    fn append_paths<W: Write>(
        &self,
        tar: &mut TarBuilder<W>,
        paths: &[PathBuf],
    ) -> anyhow::Result<usize> {
        tar.follow_symlinks(false);
        let mut count = 0;

        for path in paths {
            let name = self.archive_name(path)?;
            let metadata = fs::symlink_metadata(path)?;

            if metadata.is_dir() {
                for entry in walkdir::WalkDir::new(path).follow_links(false) {
                    let entry =
                        entry.map_err(|e| anyhow::anyhow!("Failed to walk directory: {}", e))?;
                    let entry_name = self.archive_name(entry.path())?;
                    tar.append_path_with_name(entry.path(), &entry_name)?;
                    count += 1;
                }
            } else {
                tar.append_path_with_name(path, &name)?;
                count += 1;
            }
        }

        tar.finish()?;
        Ok(count)
    }

    /// Re-read the archive and check that every saved path has an entry.
    fn verify_archive(&self, archive_path: &Path, saved: &[PathBuf]) -> anyhow::Result<()> {
        let names: BTreeSet<PathBuf> = self
            .list_entries(archive_path)?
            .into_iter()
            .map(|e| normalize(&e.path))
            .collect();

        let mut missing = Vec::new();
        for path in saved {
            let name = normalize(&self.archive_name(path)?);
            if !names.contains(&name) {
                missing.push(name.display().to_string());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BackupError::VerificationFailed {
                archive: archive_path.to_path_buf(),
                missing,
            }
            .into())
        }
    }
}

// tar stores directory entries with a trailing slash
fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
