//! Install plans
//!
//! [`InstallPlanBuilder`] validates a flat resource list (unique ids, known
//! dependencies, port mappings that name real ports, at most one install
//! target) and orders it through [`ResourceGraph`].

use std::collections::HashSet;

use engage_core::types::{Resource, ResourceRef};
use engage_core::UserError;
use tracing::debug;

use crate::errors;
use crate::graph::{GraphError, ResourceGraph};

/// Builds an [`InstallPlan`] from a resource list
#[derive(Debug, Clone)]
pub struct InstallPlanBuilder {
    resources: Vec<Resource>,
    require_install_target: bool,
    check_ports: bool,
}

impl InstallPlanBuilder {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self {
            resources,
            require_install_target: true,
            check_ports: true,
        }
    }

    /// Accept lists where no resource is marked `use_as_install_target`
    pub fn allow_missing_install_target(mut self) -> Self {
        self.require_install_target = false;
        self
    }

    /// Skip checking that mapped ports exist on both ends
    pub fn skip_port_checks(mut self) -> Self {
        self.check_ports = false;
        self
    }

    pub fn build(self) -> Result<InstallPlan, UserError> {
        self.check_unique_ids()?;
        self.check_references()?;
        if self.check_ports {
            self.check_port_mappings()?;
        }
        let target = self.install_target()?;

        let graph = ResourceGraph::from_resources(&self.resources).map_err(graph_error)?;
        let order = graph.toposort().map_err(graph_error)?;
        debug!("Install order: {}", order.join(" -> "));

        Ok(InstallPlan {
            graph,
            order,
            target,
        })
    }

    fn check_unique_ids(&self) -> Result<(), UserError> {
        let mut seen = HashSet::new();
        for resource in &self.resources {
            if !seen.insert(resource.id.as_str()) {
                return Err(UserError::new(&errors::DUPLICATE_RESOURCE)
                    .arg("id", &resource.id)
                    .for_resource(&resource.id));
            }
        }
        Ok(())
    }

    fn check_references(&self) -> Result<(), UserError> {
        let ids: HashSet<&str> = self.resources.iter().map(|r| r.id.as_str()).collect();
        for resource in &self.resources {
            for dep in resource.dependency_ids() {
                if !ids.contains(dep) {
                    return Err(UserError::new(&errors::UNKNOWN_DEPENDENCY)
                        .arg("id", &resource.id)
                        .arg("target", dep)
                        .for_resource(&resource.id));
                }
            }
        }
        Ok(())
    }

    fn check_port_mappings(&self) -> Result<(), UserError> {
        for resource in &self.resources {
            let refs = resource.inside.iter().chain(resource.environment.iter());
            for dep_ref in refs {
                let Some(dep) = self.resources.iter().find(|r| r.id == dep_ref.id) else {
                    continue;
                };
                check_ref_ports(resource, dep_ref, dep)?;
            }
        }
        Ok(())
    }

    fn install_target(&self) -> Result<Option<String>, UserError> {
        let targets: Vec<&str> = self
            .resources
            .iter()
            .filter(|r| r.properties.use_as_install_target)
            .map(|r| r.id.as_str())
            .collect();

        match targets.as_slice() {
            [] if self.require_install_target => {
                Err(UserError::new(&errors::MISSING_INSTALL_TARGET))
            }
            [] => Ok(None),
            [one] => Ok(Some(one.to_string())),
            many => Err(UserError::new(&errors::AMBIGUOUS_INSTALL_TARGET).arg("ids", many.join(", "))),
        }
    }
}

fn check_ref_ports(resource: &Resource, dep_ref: &ResourceRef, dep: &Resource) -> Result<(), UserError> {
    for (input_port, output_port) in &dep_ref.port_mapping {
        let reason = if !resource.input_ports.contains_key(input_port) {
            format!("{} has no input port {}", resource.id, input_port)
        } else if !dep.output_ports.contains_key(output_port) {
            format!("{} has no output port {}", dep.id, output_port)
        } else {
            continue;
        };
        return Err(UserError::new(&errors::PORT_MAPPING_INVALID)
            .arg("id", &resource.id)
            .arg("input_port", input_port)
            .arg("target", &dep.id)
            .arg("output_port", output_port)
            .arg("reason", reason)
            .for_resource(&resource.id));
    }
    Ok(())
}

fn graph_error(err: GraphError) -> UserError {
    match err {
        GraphError::NoRoot => UserError::new(&errors::NO_ROOT_RESOURCE),
        GraphError::Cycle { remaining } => {
            UserError::new(&errors::DEPENDENCY_CYCLE).arg("ids", remaining.join(", "))
        }
        GraphError::DuplicateNode(id) => UserError::new(&errors::DUPLICATE_RESOURCE)
            .arg("id", &id)
            .for_resource(id),
        GraphError::UnknownNode(id) => UserError::new(&errors::UNKNOWN_DEPENDENCY)
            .arg("id", "?")
            .arg("target", id),
    }
}

/// Resources on one machine, in install order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPartition {
    pub host: String,
    pub resources: Vec<String>,
}

/// A validated, ordered resource list
#[derive(Debug, Clone)]
pub struct InstallPlan {
    graph: ResourceGraph,
    order: Vec<String>,
    target: Option<String>,
}

impl InstallPlan {
    /// Ids in install order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Resources in install order
    pub fn resources(&self) -> Vec<&Resource> {
        self.order
            .iter()
            .filter_map(|id| self.graph.resource(id))
            .collect()
    }

    /// Owned copies of the resources, in install order
    pub fn to_resources(&self) -> Vec<Resource> {
        self.resources().into_iter().cloned().collect()
    }

    pub fn install_target(&self) -> Option<&Resource> {
        self.target.as_deref().and_then(|id| self.graph.resource(id))
    }

    /// Split the plan by the outermost `inside` container of each resource.
    ///
    /// Partitions appear in the order their host first appears in the plan.
    pub fn partition_by_host(&self) -> Vec<HostPartition> {
        let mut partitions: Vec<HostPartition> = Vec::new();
        for id in &self.order {
            let host = self.graph.host_of(id).unwrap_or(id.as_str()).to_string();
            match partitions.iter_mut().find(|p| p.host == host) {
                Some(partition) => partition.resources.push(id.clone()),
                None => partitions.push(HostPartition {
                    host,
                    resources: vec![id.clone()],
                }),
            }
        }
        partitions
    }

    /// The sub-plan for one host, keeping the original order
    pub fn for_host(&self, host: &str) -> Result<InstallPlan, UserError> {
        let partitions = self.partition_by_host();
        let Some(partition) = partitions.iter().find(|p| p.host == host) else {
            let hosts: Vec<&str> = partitions.iter().map(|p| p.host.as_str()).collect();
            return Err(UserError::new(&errors::UNKNOWN_HOST)
                .arg("host", host)
                .arg("hosts", hosts.join(", ")));
        };

        let keep: HashSet<&str> = partition.resources.iter().map(String::as_str).collect();
        let resources: Vec<Resource> = self
            .resources()
            .into_iter()
            .filter(|r| keep.contains(r.id.as_str()))
            .cloned()
            .map(|mut r| {
                // Cross-host environment links are satisfied by the other node
                r.environment.retain(|dep| keep.contains(dep.id.as_str()));
                r
            })
            .collect();

        InstallPlanBuilder::new(resources)
            .allow_missing_install_target()
            .skip_port_checks()
            .build()
    }
}
