//! Installed-resource database
//!
//! A JSON array of [`Resource`] objects believed installed. It is the source
//! of truth for the next `upgrade`, `backup`, `uninstall` or `restore` run.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{ensure_unique_ids, Resource};
use crate::utils::write_atomic;

/// Persisted list of installed resources
#[derive(Debug, Clone)]
pub struct InstalledResourceDatabase {
    path: PathBuf,
    resources: Vec<Resource>,
}

impl InstalledResourceDatabase {
    /// Create an empty database bound to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            resources: Vec::new(),
        }
    }

    /// Load from disk; a missing file is an empty database
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            debug!("No installed resource database at {}", path.display());
            return Ok(Self::new(path));
        }

        let content = fs::read_to_string(&path)?;
        let resources: Vec<Resource> = serde_json::from_str(&content)?;
        ensure_unique_ids(&resources)?;

        debug!(
            "Loaded {} installed resources from {}",
            resources.len(),
            path.display()
        );
        Ok(Self { path, resources })
    }

    /// Load, failing when the database does not exist
    pub fn load_existing(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(Error::file_not_found(path.display().to_string()));
        }
        Self::load(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Replace the contents, marking every resource installed
    pub fn replace(&mut self, resources: Vec<Resource>) -> Result<()> {
        ensure_unique_ids(&resources)?;
        self.resources = resources
            .into_iter()
            .map(|mut r| {
                r.properties.installed = true;
                r
            })
            .collect();
        Ok(())
    }

    /// Insert or replace by id, marking each resource installed; others are kept
    pub fn merge(&mut self, resources: Vec<Resource>) -> Result<()> {
        ensure_unique_ids(&resources)?;
        for mut resource in resources {
            resource.properties.installed = true;
            match self.resources.iter_mut().find(|r| r.id == resource.id) {
                Some(existing) => *existing = resource,
                None => self.resources.push(resource),
            }
        }
        Ok(())
    }

    /// Drop the given ids; returns how many were recorded
    pub fn remove(&mut self, ids: &[String]) -> usize {
        let before = self.resources.len();
        self.resources.retain(|r| !ids.contains(&r.id));
        before - self.resources.len()
    }

    /// Write the database with stable key ordering
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.resources)?;
        write_atomic(&self.path, json.as_bytes(), None)?;
        info!(
            "Saved {} installed resources to {}",
            self.resources.len(),
            self.path.display()
        );
        Ok(())
    }
}
