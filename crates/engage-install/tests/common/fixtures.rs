//! Resource list fixtures and context builders

use engage_core::config::PollSettings;
use engage_core::types::{Resource, ResourceKey, ResourceRef};
use engage_core::{DeploymentHome, EngineSettings};
use engage_install::{DriverRegistry, EngineOptions, InstallContext, InstallPlanBuilder, ManagedResource};
use tempfile::TempDir;

use super::mocks::MockWorld;

/// Settings with a fast, short liveness budget
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        poll: PollSettings {
            interval_ms: 1,
            max_attempts: 3,
        },
        compress_backups: false,
        ..EngineSettings::default()
    }
}

pub fn test_context(temp: &TempDir) -> InstallContext {
    InstallContext::new(DeploymentHome::new(temp.path()), fast_settings()).with_user("tester")
}

/// host <- mysql <- django, with django depending on mysql; host is the install target
pub fn web_stack(mysql_version: &str, django_version: &str) -> Vec<Resource> {
    vec![
        Resource::new("host", ResourceKey::new("ubuntu-linux", "22.04")).as_install_target(),
        Resource::new("mysql", ResourceKey::new("mysql", mysql_version)).with_inside(ResourceRef::new("host")),
        Resource::new("django", ResourceKey::new("django-app", django_version))
            .with_inside(ResourceRef::new("host"))
            .with_environment(ResourceRef::new("mysql")),
    ]
}

/// Two machines: `db1` (mysql) on `h1`, and `app2` (django) on `h2` using `db1`
pub fn two_node_stack(db_version: &str, app_version: &str) -> Vec<Resource> {
    vec![
        Resource::new("h1", ResourceKey::new("ubuntu-linux", "22.04")).as_install_target(),
        Resource::new("db1", ResourceKey::new("mysql", db_version)).with_inside(ResourceRef::new("h1")),
        Resource::new("h2", ResourceKey::new("ubuntu-linux", "22.04")),
        Resource::new("app2", ResourceKey::new("django-app", app_version))
            .with_inside(ResourceRef::new("h2"))
            .with_environment(ResourceRef::new("db1")),
    ]
}

pub fn on_node(node: &str) -> EngineOptions {
    EngineOptions {
        node: Some(node.to_string()),
        ..EngineOptions::default()
    }
}

/// Registry with mock drivers for [`web_stack`]; mysql is a service
pub fn mock_registry(world: &MockWorld) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    world.register(&mut registry, "ubuntu-linux", false);
    world.register(&mut registry, "mysql", true);
    world.register(&mut registry, "django-app", false);
    registry
}

/// Plan and instantiate `resources` in install order
pub fn managed(registry: &DriverRegistry, resources: Vec<Resource>) -> Vec<ManagedResource> {
    let plan = InstallPlanBuilder::new(resources).build().unwrap();
    registry.instantiate_all(plan.resources()).unwrap()
}
