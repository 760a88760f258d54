//! Manifest handed to the elevated backup helper.
//!
//! The parent process writes the manifest to a temporary file (mode 0600 via
//! `tempfile`) and passes only its path on the helper's command line.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::store::{BackupStore, SaveOptions};

/// Operation the helper performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelperOperation {
    Save,
    Restore,
}

/// Everything the helper needs to repeat a save or restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperManifest {
    pub operation: HelperOperation,

    /// Absolute paths to archive (save only)
    #[serde(default)]
    pub files: Vec<PathBuf>,

    pub archive: PathBuf,

    /// Delete originals after save, or the archive after restore
    #[serde(default, rename = "move")]
    pub move_files: bool,

    #[serde(default)]
    pub skip_missing: bool,

    #[serde(default)]
    pub compress: bool,

    pub root: PathBuf,
}

impl HelperManifest {
    pub fn save(store: &BackupStore, files: &[PathBuf], archive: &Path, options: SaveOptions) -> Self {
        Self {
            operation: HelperOperation::Save,
            files: files.to_vec(),
            archive: archive.to_path_buf(),
            move_files: options.move_files,
            skip_missing: options.skip_missing,
            compress: store.compresses(),
            root: store.root().to_path_buf(),
        }
    }

    pub fn restore(store: &BackupStore, archive: &Path, move_archive: bool) -> Self {
        Self {
            operation: HelperOperation::Restore,
            files: Vec::new(),
            archive: archive.to_path_buf(),
            move_files: move_archive,
            skip_missing: false,
            compress: store.compresses(),
            root: store.root().to_path_buf(),
        }
    }

    /// Write to a new temporary file; the file is removed when dropped.
    pub fn write_temp(&self) -> anyhow::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("engage-backup-")
            .suffix(".json")
            .tempfile()?;
        file.write_all(serde_json::to_string(self)?.as_bytes())?;
        file.as_file().sync_all()?;
        Ok(file)
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Perform the operation in this process.
    pub fn execute(&self) -> anyhow::Result<()> {
        let store = BackupStore::new()
            .with_root(&self.root)
            .with_compression(self.compress);

        match self.operation {
            HelperOperation::Save => {
                let options = SaveOptions::default()
                    .moving(self.move_files)
                    .skipping_missing(self.skip_missing);
                store.save_with(&self.files, &self.archive, options)?;
            }
            HelperOperation::Restore => {
                store.restore(&self.archive, self.move_files)?;
            }
        }
        Ok(())
    }
}
