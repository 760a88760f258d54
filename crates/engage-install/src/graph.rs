//! Resource dependency graph
//!
//! Nodes are resource ids with an optional [`Resource`] label; an edge runs
//! from a dependency to the resource that depends on it and carries the
//! [`Relation`] that created it. Ordering uses Kahn's algorithm with ties
//! broken by insertion order, so the same resource list always yields the
//! same plan.

use std::collections::{BTreeSet, HashMap, HashSet};

use engage_core::types::{PortMapping, Resource};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use thiserror::Error;

/// How a resource depends on another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// The dependent runs inside the dependency (a host, a container, a runtime)
    Inside,
    /// The dependency must be present for the dependent to run
    Environment,
}

/// Edge label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub kind: RelationKind,
    pub port_mapping: PortMapping,
}

impl Relation {
    pub fn inside() -> Self {
        Self {
            kind: RelationKind::Inside,
            port_mapping: PortMapping::new(),
        }
    }

    pub fn environment() -> Self {
        Self {
            kind: RelationKind::Environment,
            port_mapping: PortMapping::new(),
        }
    }

    pub fn with_port_mapping(mut self, port_mapping: PortMapping) -> Self {
        self.port_mapping = port_mapping;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Dependency graph has no root: every resource depends on another")]
    NoRoot,

    #[error("Dependency cycle among: {}", .remaining.join(", "))]
    Cycle { remaining: Vec<String> },

    #[error("Resource {0} is already in the graph")]
    DuplicateNode(String),

    #[error("Resource {0} is not in the graph")]
    UnknownNode(String),
}

#[derive(Debug, Clone)]
struct Node {
    id: String,
    resource: Option<Resource>,
}

/// Directed dependency graph over resource ids
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    graph: DiGraph<Node, Relation>,
    index: HashMap<String, NodeIndex>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a resource list, one edge per `inside` or
    /// `environment` reference.
    pub fn from_resources(resources: &[Resource]) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for resource in resources {
            graph.add_resource(resource.clone())?;
        }
        for resource in resources {
            if let Some(inside) = &resource.inside {
                graph.add_edge(
                    &resource.id,
                    &inside.id,
                    Relation::inside().with_port_mapping(inside.port_mapping.clone()),
                )?;
            }
            for dep in &resource.environment {
                graph.add_edge(
                    &resource.id,
                    &dep.id,
                    Relation::environment().with_port_mapping(dep.port_mapping.clone()),
                )?;
            }
        }
        Ok(graph)
    }

    /// Add an unlabelled node
    pub fn add_node(&mut self, id: &str) -> Result<(), GraphError> {
        self.insert(id.to_string(), None)
    }

    /// Add a node labelled with its resource
    pub fn add_resource(&mut self, resource: Resource) -> Result<(), GraphError> {
        self.insert(resource.id.clone(), Some(resource))
    }

    fn insert(&mut self, id: String, resource: Option<Resource>) -> Result<(), GraphError> {
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        let idx = self.graph.add_node(Node {
            id: id.clone(),
            resource,
        });
        self.index.insert(id, idx);
        Ok(())
    }

    /// Record that `dependent` depends on `dependency`
    pub fn add_edge(
        &mut self,
        dependent: &str,
        dependency: &str,
        relation: Relation,
    ) -> Result<(), GraphError> {
        let to = self.node_index(dependent)?;
        let from = self.node_index(dependency)?;
        self.graph.add_edge(from, to, relation);
        Ok(())
    }

    fn node_index(&self, id: &str) -> Result<NodeIndex, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Resource label of a node, if it has one
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.index
            .get(id)
            .and_then(|idx| self.graph[*idx].resource.as_ref())
    }

    /// Direct dependencies of `id` with the relation to each
    pub fn dependencies(&self, id: &str) -> Vec<(&str, &Relation)> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Resources that directly depend on `id`
    pub fn dependents(&self, id: &str) -> Vec<(&str, &Relation)> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<(&str, &Relation)> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut found: Vec<(NodeIndex, &Relation)> = self
            .graph
            .edges_directed(idx, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Incoming => edge.source(),
                    Direction::Outgoing => edge.target(),
                };
                (other, edge.weight())
            })
            .collect();
        found.sort_by_key(|(other, _)| other.index());
        found
            .into_iter()
            .map(|(other, relation)| (self.graph[other].id.as_str(), relation))
            .collect()
    }

    /// Resources with no dependencies, in insertion order
    pub fn roots(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|idx| {
                self.graph
                    .edges_directed(*idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| self.graph[idx].id.as_str())
            .collect()
    }

    /// Ids in dependency order.
    ///
    /// Among resources whose dependencies are all satisfied, the one added
    /// first comes first. The graph itself is left untouched.
    pub fn toposort(&self) -> Result<Vec<String>, GraphError> {
        if self.graph.node_count() == 0 {
            return Ok(Vec::new());
        }

        let mut pending: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.edges_directed(idx, Direction::Incoming).count())
            .collect();

        let mut ready: BTreeSet<usize> = pending
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| i)
            .collect();

        if ready.is_empty() {
            return Err(GraphError::NoRoot);
        }

        let mut order = Vec::with_capacity(pending.len());
        while let Some(next) = ready.pop_first() {
            let idx = NodeIndex::new(next);
            order.push(self.graph[idx].id.clone());

            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let target = edge.target().index();
                pending[target] -= 1;
                if pending[target] == 0 {
                    ready.insert(target);
                }
            }
        }

        if order.len() < self.graph.node_count() {
            let remaining = pending
                .iter()
                .enumerate()
                .filter(|(_, count)| **count > 0)
                .map(|(i, _)| self.graph[NodeIndex::new(i)].id.clone())
                .collect();
            return Err(GraphError::Cycle { remaining });
        }

        Ok(order)
    }

    /// Follow `inside` edges from `id` to the outermost container
    pub fn host_of(&self, id: &str) -> Option<&str> {
        let mut current = *self.index.get(id)?;
        let mut seen = HashSet::new();

        while seen.insert(current) {
            let parent = self
                .graph
                .edges_directed(current, Direction::Incoming)
                .find(|edge| edge.weight().kind == RelationKind::Inside)
                .map(|edge| edge.source());
            match parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Some(self.graph[current].id.as_str())
    }
}
