//! Backup records: which archive holds which resource's state.

use chrono::{DateTime, Utc};
use engage_core::utils::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::compression::archive_extension;

/// Name of the index file inside a backup directory.
pub const INDEX_FILENAME: &str = "backup_records.json";

/// One resource's archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub resource_id: String,

    /// Archive file name, relative to the backup directory
    pub archive: PathBuf,

    /// SHA256 of the archive
    pub checksum: String,

    pub created_at: DateTime<Utc>,

    /// True when written while uninstalling a partially installed resource
    #[serde(default)]
    pub incomplete_install: bool,
}

impl BackupRecord {
    /// Conventional archive file name for a resource.
    pub fn archive_name(resource_id: &str, compress: bool) -> PathBuf {
        let safe: String = resource_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        PathBuf::from(format!("{}.{}", safe, archive_extension(compress)))
    }
}

/// Index of every record in one backup directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupIndex {
    #[serde(default)]
    pub records: BTreeMap<String, BackupRecord>,
}

impl BackupIndex {
    /// Load the index of `dir`; a missing index is empty.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(INDEX_FILENAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&dir.join(INDEX_FILENAME), json.as_bytes(), None)?;
        Ok(())
    }

    pub fn insert(&mut self, record: BackupRecord) {
        self.records.insert(record.resource_id.clone(), record);
    }

    pub fn get(&self, resource_id: &str) -> Option<&BackupRecord> {
        self.records.get(resource_id)
    }

    /// Absolute archive path for a resource, if recorded.
    pub fn archive_path(&self, dir: &Path, resource_id: &str) -> Option<PathBuf> {
        self.get(resource_id).map(|r| dir.join(&r.archive))
    }
}
