//! Resource type definitions
//!
//! A resource list is produced by the external configuration tool and read
//! as JSON. All maps are `BTreeMap` so the installed-resource database is
//! written with stable key order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::{Error, Result};

/// A named group of port properties
pub type PortValues = BTreeMap<String, Value>;

/// Maps a dependent's input port name to the dependency's output port name
pub type PortMapping = BTreeMap<String, String>;

/// Resource key: the (name, version) pair used to look up a driver
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub name: String,
    pub version: String,
}

impl ResourceKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Link from a resource to one it depends on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Id of the dependency
    pub id: String,

    /// Key of the dependency, informational
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<ResourceKey>,

    /// Input port name on the dependent -> output port name on the dependency
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub port_mapping: PortMapping,
}

impl ResourceRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: None,
            port_mapping: PortMapping::new(),
        }
    }

    /// Add a port mapping entry
    pub fn with_port(mut self, input_port: &str, output_port: &str) -> Self {
        self.port_mapping
            .insert(input_port.to_string(), output_port.to_string());
        self
    }
}

/// Resource flags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceProperties {
    #[serde(default)]
    pub installed: bool,

    #[serde(default)]
    pub use_as_install_target: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_resource_key: Option<ResourceKey>,

    /// Flags this engine does not interpret, kept for round-tripping
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A unit of installable software or configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,

    pub key: ResourceKey,

    #[serde(default)]
    pub config_port: PortValues,

    #[serde(default)]
    pub input_ports: BTreeMap<String, PortValues>,

    #[serde(default)]
    pub output_ports: BTreeMap<String, PortValues>,

    #[serde(default)]
    pub properties: ResourceProperties,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inside: Option<ResourceRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<ResourceRef>,
}

impl Resource {
    pub fn new(id: impl Into<String>, key: ResourceKey) -> Self {
        Self {
            id: id.into(),
            key,
            config_port: PortValues::new(),
            input_ports: BTreeMap::new(),
            output_ports: BTreeMap::new(),
            properties: ResourceProperties::default(),
            inside: None,
            environment: Vec::new(),
        }
    }

    pub fn with_inside(mut self, inside: ResourceRef) -> Self {
        self.inside = Some(inside);
        self
    }

    pub fn with_environment(mut self, dep: ResourceRef) -> Self {
        self.environment.push(dep);
        self
    }

    pub fn with_input_port(mut self, name: &str, values: PortValues) -> Self {
        self.input_ports.insert(name.to_string(), values);
        self
    }

    pub fn with_output_port(mut self, name: &str, values: PortValues) -> Self {
        self.output_ports.insert(name.to_string(), values);
        self
    }

    pub fn with_config(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.config_port.insert(name.to_string(), value.into());
        self
    }

    pub fn as_install_target(mut self) -> Self {
        self.properties.use_as_install_target = true;
        self
    }

    /// Ids of every resource this one depends on, `inside` first
    pub fn dependency_ids(&self) -> impl Iterator<Item = &str> {
        self.inside
            .iter()
            .chain(self.environment.iter())
            .map(|r| r.id.as_str())
    }

    /// Look up a config port value as a string
    pub fn config_str(&self, name: &str) -> Option<&str> {
        self.config_port.get(name).and_then(Value::as_str)
    }
}

/// Parse a resource list from JSON, rejecting duplicate ids
pub fn parse_resource_list(json: &str) -> Result<Vec<Resource>> {
    let resources: Vec<Resource> = serde_json::from_str(json)?;
    ensure_unique_ids(&resources)?;
    Ok(resources)
}

/// Check that every resource id is unique
pub fn ensure_unique_ids(resources: &[Resource]) -> Result<()> {
    let mut seen = HashSet::new();
    for resource in resources {
        if !seen.insert(resource.id.as_str()) {
            return Err(Error::duplicate_resource(&resource.id));
        }
    }
    Ok(())
}
