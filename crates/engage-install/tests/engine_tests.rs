//! Engine tests: database persistence, upgrade rollback, backup and restore

mod common;

use std::fs;

use common::*;
use engage_core::user_error::codes;
use engage_core::{InstalledResourceDatabase, UserError};
use engage_install::engine::{DATABASE_BACKUP_FILE, HOME_ARCHIVE_STEM};
use engage_install::{
    BackupEngine, EngineOptions, InstallEngine, InstallContext, RestoreEngine, UninstallEngine, UpgradeEngine,
};
use tempfile::TempDir;

fn recorded(ctx: &InstallContext) -> Vec<(String, String)> {
    InstalledResourceDatabase::load(ctx.home.installed_resources_file())
        .unwrap()
        .resources()
        .iter()
        .map(|r| (r.id.clone(), r.key.version.clone()))
        .collect()
}

fn pair(id: &str, version: &str) -> (String, String) {
    (id.to_string(), version.to_string())
}

#[test]
fn test_install_records_database() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);

    let ids = InstallEngine::new(&ctx, &registry).run(web_stack("5.1", "1.0")).unwrap();

    assert_eq!(ids, vec!["host", "mysql", "django"]);
    assert_eq!(
        recorded(&ctx),
        vec![pair("host", "22.04"), pair("mysql", "5.1"), pair("django", "1.0")]
    );
    let db = InstalledResourceDatabase::load(ctx.home.installed_resources_file()).unwrap();
    assert!(db.resources().iter().all(|r| r.properties.installed));
}

#[test]
fn test_dry_run_does_not_persist() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp).with_dry_run(true);
    let world = MockWorld::new();
    let registry = mock_registry(&world);

    InstallEngine::new(&ctx, &registry).run(web_stack("5.1", "1.0")).unwrap();

    assert!(!ctx.home.installed_resources_file().exists());
    assert!(world.calls_for("install").is_empty());
}

#[test]
fn test_failed_install_reports_rolled_back_and_keeps_database() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    world.fail("django", "install");

    let err = InstallEngine::new(&ctx, &registry).run(web_stack("5.1", "1.0")).unwrap_err();

    let user = err.downcast_ref::<UserError>().unwrap();
    assert!(user.is(&codes::INSTALL_ROLLED_BACK));
    assert_eq!(user.resource_id.as_deref(), Some("django"));
    assert!(!ctx.home.installed_resources_file().exists());
}

#[test]
fn test_upgrade_replaces_database() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(web_stack("5.0", "1.0")).unwrap();

    let engine = UpgradeEngine::new(&ctx, &registry);
    engine.run(web_stack("5.1", "1.1")).unwrap();

    assert_eq!(
        recorded(&ctx),
        vec![pair("host", "22.04"), pair("mysql", "5.1"), pair("django", "1.1")]
    );
    assert!(engine.backup_dir().join(DATABASE_BACKUP_FILE).exists());
    assert!(world.is_running("mysql"));
}

#[test]
fn test_upgrade_failure_restores_previous_installation() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(web_stack("5.0", "1.0")).unwrap();
    world.fail("django", "upgrade");
    world.reset_calls();

    let err = UpgradeEngine::new(&ctx, &registry)
        .run(web_stack("5.1", "1.1"))
        .unwrap_err();

    let user = err.downcast_ref::<UserError>().unwrap();
    assert!(user.is(&codes::UPGRADE_ROLLBACK_IN_PROGRESS));
    assert_eq!(user.resource_id.as_deref(), Some("django"));
    assert!(user.original_error.is_some());

    assert_eq!(
        recorded(&ctx),
        vec![pair("host", "22.04"), pair("mysql", "5.0"), pair("django", "1.0")]
    );
    assert_eq!(world.calls_for("restore"), vec!["host", "mysql", "django"]);
    assert!(world.is_installed("django"));
    assert!(world.is_running("mysql"));
}

#[test]
fn test_upgrade_with_failed_restore_reports_rollback_failure() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(web_stack("5.0", "1.0")).unwrap();
    world.fail("django", "upgrade");
    world.fail("mysql", "restore");

    let err = UpgradeEngine::new(&ctx, &registry)
        .with_options(EngineOptions {
            force_stop_on_error: true,
            ..EngineOptions::default()
        })
        .run(web_stack("5.1", "1.1"))
        .unwrap_err();

    let user = err.downcast_ref::<UserError>().unwrap();
    assert!(user.is(&codes::ROLLBACK_FAILED));
    assert_eq!(user.resource_id.as_deref(), Some("django"));
    assert_eq!(
        user.rollback_error.as_ref().and_then(|e| e.resource_id.as_deref()),
        Some("mysql")
    );
    assert_eq!(world.running_count(), 0);
}

#[test]
fn test_upgrade_without_database_installs() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);

    UpgradeEngine::new(&ctx, &registry).run(web_stack("5.1", "1.0")).unwrap();

    assert_eq!(world.calls_for("install"), vec!["host", "mysql", "django"]);
    assert_eq!(recorded(&ctx).len(), 3);
}

#[test]
fn test_uninstall_clears_database() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(web_stack("5.1", "1.0")).unwrap();

    let backup = temp.path().join("uninstalled");
    let ids = UninstallEngine::new(&ctx, &registry).run(&backup).unwrap();

    assert_eq!(ids, vec!["django", "mysql", "host"]);
    assert!(recorded(&ctx).is_empty());
    assert_eq!(world.running_count(), 0);
}

#[test]
fn test_backup_restarts_services_and_archives_configuration() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(web_stack("5.1", "1.0")).unwrap();
    world.reset_calls();

    let backup = temp.path().join("backup");
    let ids = BackupEngine::new(&ctx, &registry).run(&backup).unwrap();

    assert_eq!(ids, vec!["django", "mysql", "host"]);
    assert_eq!(world.calls_for("stop"), vec!["mysql"]);
    assert_eq!(world.calls_for("start"), vec!["mysql"]);
    assert!(world.is_running("mysql"));
    assert!(backup.join(DATABASE_BACKUP_FILE).exists());
    assert!(backup.join(format!("{}.tar", HOME_ARCHIVE_STEM)).exists());
}

#[test]
fn test_restore_from_backup_records_resources() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(web_stack("5.1", "1.0")).unwrap();

    let backup = temp.path().join("backup");
    BackupEngine::new(&ctx, &registry).run(&backup).unwrap();
    UninstallEngine::new(&ctx, &registry)
        .run(&temp.path().join("uninstalled"))
        .unwrap();
    assert!(recorded(&ctx).is_empty());

    let ids = RestoreEngine::new(&ctx, &registry).restore(&backup).unwrap();

    assert_eq!(ids, vec!["host", "mysql", "django"]);
    assert_eq!(recorded(&ctx).len(), 3);
    assert!(world.is_running("mysql"));
}

#[test]
fn test_restore_engage_brings_back_configuration() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(web_stack("5.1", "1.0")).unwrap();

    let backup = temp.path().join("backup");
    BackupEngine::new(&ctx, &registry).run(&backup).unwrap();
    fs::remove_dir_all(ctx.home.config_dir()).unwrap();

    let archive = RestoreEngine::new(&ctx, &registry).restore_engage(&backup).unwrap();

    assert!(archive.ends_with(format!("{}.tar", HOME_ARCHIVE_STEM)));
    assert_eq!(recorded(&ctx).len(), 3);
}

#[test]
fn test_restore_without_backup_is_reported() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);

    let err = RestoreEngine::new(&ctx, &registry)
        .restore_engage(&temp.path().join("missing"))
        .unwrap_err();
    let user = err.downcast_ref::<UserError>().unwrap();
    assert!(user.is(&engage_backup::error::codes::BACKUP_MISSING));
}

#[test]
fn test_upgrade_restores_resources_removed_before_uninstall_failure() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(web_stack("5.0", "1.0")).unwrap();
    world.fail("mysql", "uninstall");
    world.reset_calls();

    let err = UpgradeEngine::new(&ctx, &registry)
        .run(web_stack("5.1", "1.1"))
        .unwrap_err();

    let user = err.downcast_ref::<UserError>().unwrap();
    assert!(user.is(&codes::UPGRADE_ROLLBACK_IN_PROGRESS));
    assert_eq!(user.resource_id.as_deref(), Some("mysql"));

    assert_eq!(world.calls_for("uninstall"), vec!["django", "mysql"]);
    assert_eq!(world.calls_for("restore"), vec!["django"]);
    assert!(world.calls_for("upgrade").is_empty());
    assert!(world.is_installed("django"));
    assert!(world.is_installed("mysql"));
    assert!(world.is_running("mysql"));
    assert_eq!(
        recorded(&ctx),
        vec![pair("host", "22.04"), pair("mysql", "5.0"), pair("django", "1.0")]
    );
}

#[test]
fn test_upgrade_uninstall_failure_with_failed_restore_reports_both() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(web_stack("5.0", "1.0")).unwrap();
    world.fail("mysql", "uninstall");
    world.fail("django", "restore");

    let err = UpgradeEngine::new(&ctx, &registry)
        .run(web_stack("5.1", "1.1"))
        .unwrap_err();

    let user = err.downcast_ref::<UserError>().unwrap();
    assert!(user.is(&codes::ROLLBACK_FAILED));
    assert_eq!(user.resource_id.as_deref(), Some("mysql"));
    assert_eq!(
        user.rollback_error.as_ref().and_then(|e| e.resource_id.as_deref()),
        Some("django")
    );
    assert_eq!(recorded(&ctx).len(), 3);
}

#[test]
fn test_backup_restarts_services_stopped_before_a_stop_failure() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let mut registry = mock_registry(&world);
    world.register(&mut registry, "django-app", true);
    InstallEngine::new(&ctx, &registry).run(web_stack("5.1", "1.0")).unwrap();
    assert!(world.is_running("django"));
    world.fail("mysql", "stop");
    world.fail("mysql", "force_stop");
    world.reset_calls();

    let err = BackupEngine::new(&ctx, &registry)
        .run(&temp.path().join("backup"))
        .unwrap_err();

    let user = err.downcast_ref::<UserError>().unwrap();
    assert_eq!(user.resource_id.as_deref(), Some("mysql"));
    assert_eq!(world.calls_for("stop"), vec!["django", "mysql"]);
    assert_eq!(world.calls_for("start"), vec!["django"]);
    assert!(world.calls_for("backup").is_empty());
    assert!(world.is_running("django"));
    assert!(world.is_running("mysql"));
}

#[test]
fn test_node_installs_merge_into_database() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);

    let first = InstallEngine::new(&ctx, &registry)
        .with_options(on_node("h1"))
        .run(two_node_stack("5.1", "1.0"))
        .unwrap();
    assert_eq!(first, vec!["h1", "db1"]);
    assert_eq!(recorded(&ctx), vec![pair("h1", "22.04"), pair("db1", "5.1")]);

    InstallEngine::new(&ctx, &registry)
        .with_options(on_node("h2"))
        .run(two_node_stack("5.1", "1.0"))
        .unwrap();

    let db = InstalledResourceDatabase::load(ctx.home.installed_resources_file()).unwrap();
    let mut ids: Vec<_> = db.resources().iter().map(|r| r.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["app2", "db1", "h1", "h2"]);
    // The link to the other node is kept in the record
    assert_eq!(db.get("app2").unwrap().environment[0].id, "db1");
    assert!(["h1", "db1", "h2", "app2"].iter().all(|id| world.is_installed(id)));
}

#[test]
fn test_node_uninstall_removes_only_that_partition() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(two_node_stack("5.1", "1.0")).unwrap();

    let ids = UninstallEngine::new(&ctx, &registry)
        .with_options(on_node("h2"))
        .run(&temp.path().join("uninstalled"))
        .unwrap();

    assert_eq!(ids, vec!["app2", "h2"]);
    assert_eq!(recorded(&ctx), vec![pair("h1", "22.04"), pair("db1", "5.1")]);
    assert!(world.is_installed("db1"));
    assert!(world.is_running("db1"));
    assert!(!world.is_installed("app2"));
}

#[test]
fn test_node_uninstall_refuses_host_other_nodes_depend_on() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(two_node_stack("5.1", "1.0")).unwrap();

    let err = UninstallEngine::new(&ctx, &registry)
        .with_options(on_node("h1"))
        .run(&temp.path().join("uninstalled"))
        .unwrap_err();

    let user = err.downcast_ref::<UserError>().unwrap();
    assert!(user.is(&engage_install::errors::NODE_HAS_DEPENDENTS));
    assert!(world.calls_for("uninstall").is_empty());
    assert!(world.is_installed("db1"));
    assert_eq!(recorded(&ctx).len(), 4);
}

#[test]
fn test_node_upgrade_leaves_other_nodes_recorded() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(two_node_stack("5.0", "1.0")).unwrap();
    world.reset_calls();

    UpgradeEngine::new(&ctx, &registry)
        .with_options(on_node("h2"))
        .run(two_node_stack("5.1", "1.1"))
        .unwrap();

    let mut versions = recorded(&ctx);
    versions.sort();
    assert_eq!(
        versions,
        vec![pair("app2", "1.1"), pair("db1", "5.0"), pair("h1", "22.04"), pair("h2", "22.04")]
    );
    assert_eq!(world.calls_for("uninstall"), vec!["app2", "h2"]);
    assert!(world.calls_for("stop").is_empty());
}

#[test]
fn test_node_restore_merges_partition() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    InstallEngine::new(&ctx, &registry).run(two_node_stack("5.1", "1.0")).unwrap();

    let backup = temp.path().join("backup");
    BackupEngine::new(&ctx, &registry)
        .with_options(on_node("h2"))
        .run(&backup)
        .unwrap();
    UninstallEngine::new(&ctx, &registry)
        .with_options(on_node("h2"))
        .run(&temp.path().join("uninstalled"))
        .unwrap();
    assert_eq!(recorded(&ctx).len(), 2);

    let ids = RestoreEngine::new(&ctx, &registry)
        .with_options(on_node("h2"))
        .restore(&backup)
        .unwrap();

    assert_eq!(ids, vec!["h2", "app2"]);
    let db = InstalledResourceDatabase::load(ctx.home.installed_resources_file()).unwrap();
    assert_eq!(db.resources().len(), 4);
    assert_eq!(db.get("app2").unwrap().environment[0].id, "db1");
}
