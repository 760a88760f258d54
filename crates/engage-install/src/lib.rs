//! Install planning and execution for Engage
//!
//! - [`graph`]: resource dependency graph with deterministic Kahn ordering
//! - [`plan`]: turns a flat resource list into a validated install plan
//! - [`manager`]: the driver contract every resource manager implements
//! - [`registry`]: maps `(name, version)` keys to driver constructors
//! - [`sequencer`]: install, upgrade-with-rollback, uninstall, backup, restore
//! - [`engine`]: top-level runs that read and write the installed-resource database

pub mod context;
pub mod drivers;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod graph;
pub mod ledger;
pub mod manager;
pub mod plan;
pub mod process;
pub mod registry;
pub mod sequencer;
pub mod sudo;

pub use context::InstallContext;
pub use engine::{
    BackupEngine, EngineOptions, InstallEngine, RestoreEngine, UninstallEngine, UpgradeEngine,
};
pub use graph::{GraphError, Relation, RelationKind, ResourceGraph};
pub use ledger::StatusLedger;
pub use manager::{BackupFiles, ManagedResource, Package, PackageKind, ResourceManager, ServiceManager};
pub use plan::{HostPartition, InstallPlan, InstallPlanBuilder};
pub use registry::{DriverManifest, DriverRegistry};
pub use events::{EventEnvelope, ResourceEvent, ResourceState};
pub use sequencer::{InstallOptions, InstallSequencer, Interrupted, MaintenanceReport, SequenceOutcome};
