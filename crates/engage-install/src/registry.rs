//! Driver registry
//!
//! Maps a resource key `(name, version)` to a driver constructor and the
//! package it installs. A registration with version `*` matches any version
//! of that name when no exact entry exists.
//!
//! Registrations come from code ([`DriverRegistry::register`]) or from the
//! deployment's `config/drivers.yaml`:
//!
//! ```yaml
//! drivers:
//!   - name: ubuntu-linux
//!     version: "*"
//!     kind: host
//!   - name: mysql
//!     version: "5.1"
//!     kind: command
//!     package: { kind: reference, location: mysql-server }
//!     command:
//!       install: apt-get install -y {package}
//!       is-installed: dpkg -s {package}
//!       sudo: true
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use engage_core::types::{Resource, ResourceKey};
use engage_core::UserError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::drivers::{CommandDriver, CommandSpec, HostDriver};
use crate::errors;
use crate::manager::{ManagedResource, Package, ResourceManager};

/// Version that matches any version of a driver name
pub const ANY_VERSION: &str = "*";

/// Builds a driver for one resource
pub type DriverConstructor = Box<dyn Fn(&Resource) -> anyhow::Result<Box<dyn ResourceManager>>>;

/// Built-in driver kinds available from `drivers.yaml`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    Host,
    Command,
}

/// One entry of `drivers.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverEntry {
    pub name: String,

    pub version: String,

    pub kind: DriverKind,

    #[serde(default)]
    pub package: Package,

    #[serde(default)]
    pub command: Option<CommandSpec>,
}

/// Contents of `drivers.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverManifest {
    #[serde(default)]
    pub drivers: Vec<DriverEntry>,
}

impl DriverManifest {
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml_ng::from_str(content)?)
    }
}

struct Registration {
    constructor: DriverConstructor,
    package: Package,
}

/// Explicit `(name, version)` to driver mapping
#[derive(Default)]
pub struct DriverRegistry {
    entries: HashMap<ResourceKey, Registration>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor; replaces any earlier entry for `key`
    pub fn register<F>(&mut self, key: ResourceKey, package: Package, constructor: F)
    where
        F: Fn(&Resource) -> anyhow::Result<Box<dyn ResourceManager>> + 'static,
    {
        debug!("Registered driver for {}", key);
        self.entries.insert(
            key,
            Registration {
                constructor: Box::new(constructor),
                package,
            },
        );
    }

    /// Registry populated from a parsed manifest
    pub fn from_manifest(manifest: &DriverManifest) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        registry.extend_from_manifest(manifest, "drivers.yaml")?;
        Ok(registry)
    }

    /// Load `drivers.yaml`; a missing file yields an empty registry
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("No driver manifest at {}", path.display());
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        let manifest = DriverManifest::from_yaml(&content).map_err(|e| {
            UserError::new(&errors::DRIVER_MANIFEST_INVALID)
                .arg("path", path.display())
                .arg("reason", &e)
        })?;

        let mut registry = Self::new();
        registry.extend_from_manifest(&manifest, &path.display().to_string())?;
        info!("Loaded {} drivers from {}", registry.len(), path.display());
        Ok(registry)
    }

    fn extend_from_manifest(&mut self, manifest: &DriverManifest, source: &str) -> anyhow::Result<()> {
        for entry in &manifest.drivers {
            let key = ResourceKey::new(&entry.name, &entry.version);
            match entry.kind {
                DriverKind::Host => {
                    self.register(key, entry.package.clone(), |resource| {
                        Ok(Box::new(HostDriver::new(resource.clone())))
                    });
                }
                DriverKind::Command => {
                    let Some(spec) = entry.command.clone() else {
                        return Err(UserError::new(&errors::DRIVER_MANIFEST_INVALID)
                            .arg("path", source)
                            .arg("reason", format!("driver {} has kind command but no command section", key))
                            .into());
                    };
                    if !spec.detects_install() {
                        return Err(UserError::new(&errors::DRIVER_MANIFEST_INVALID)
                            .arg("path", source)
                            .arg("reason", format!("driver {} sets neither installed-marker nor is-installed", key))
                            .into());
                    }
                    self.register(key, entry.package.clone(), move |resource| {
                        Ok(Box::new(CommandDriver::new(resource.clone(), spec.clone())))
                    });
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: &ResourceKey) -> Option<&Registration> {
        self.entries
            .get(key)
            .or_else(|| self.entries.get(&ResourceKey::new(&key.name, ANY_VERSION)))
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.lookup(key).is_some()
    }

    /// Construct the driver for `resource`
    pub fn instantiate(&self, resource: &Resource) -> anyhow::Result<ManagedResource> {
        let Some(registration) = self.lookup(&resource.key) else {
            return Err(UserError::new(&errors::DRIVER_NOT_FOUND)
                .arg("id", &resource.id)
                .arg("key", &resource.key)
                .for_resource(&resource.id)
                .into());
        };
        let manager = (registration.constructor)(resource)?;
        Ok(ManagedResource::new(manager, registration.package.clone()))
    }

    /// Construct drivers for every resource, keeping order
    pub fn instantiate_all<'a, I>(&self, resources: I) -> anyhow::Result<Vec<ManagedResource>>
    where
        I: IntoIterator<Item = &'a Resource>,
    {
        resources.into_iter().map(|r| self.instantiate(r)).collect()
    }
}
