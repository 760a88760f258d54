//! Install sequencing and rollback tests
//!
//! Exercises the sequencer against recording mock drivers:
//! - Idempotent install and service start
//! - Rollback after execution failures, including failed rollbacks
//! - Validation failures that stop without rollback
//! - Reverse-order uninstall and backup with services stopped first

mod common;

use common::*;
use engage_core::UserError;
use engage_install::errors;
use engage_install::ledger::EventFilter;
use engage_install::{InstallOptions, InstallSequencer, ResourceState, SequenceOutcome};
use tempfile::TempDir;

#[test]
fn test_install_runs_in_dependency_order_and_starts_services() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let resources = managed(&registry, web_stack("5.1", "1.0"));

    let mut sequencer = InstallSequencer::new(&ctx);
    let outcome = sequencer.install(&resources, InstallOptions::default()).unwrap();

    assert_eq!(
        outcome,
        SequenceOutcome::Completed(vec!["host".into(), "mysql".into(), "django".into()])
    );
    assert_eq!(world.calls_for("install"), vec!["host", "mysql", "django"]);
    assert!(world.is_running("mysql"));
    assert!(world.position("start:mysql").unwrap() < world.position("install:django").unwrap());
    assert_eq!(sequencer.state("django"), Some(ResourceState::Installed));
    assert_eq!(sequencer.state("mysql"), Some(ResourceState::Started));
}

#[test]
fn test_install_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let resources = managed(&registry, web_stack("5.1", "1.0"));

    InstallSequencer::new(&ctx)
        .install(&resources, InstallOptions::default())
        .unwrap();
    world.reset_calls();

    let outcome = InstallSequencer::new(&ctx)
        .install(&resources, InstallOptions::default())
        .unwrap();
    assert!(outcome.is_completed());
    assert!(world.calls_for("install").is_empty());
    assert!(world.calls_for("validate_pre_install").is_empty());
    assert!(world.calls_for("start").is_empty());
}

#[test]
fn test_install_failure_rolls_back_earlier_resources() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let resources = managed(&registry, web_stack("5.1", "1.0"));
    world.fail("django", "install");

    let outcome = InstallSequencer::new(&ctx)
        .install(&resources, InstallOptions::default())
        .unwrap();

    let SequenceOutcome::RollbackSucceeded { resource_id, cause } = outcome else {
        panic!("expected a successful rollback, got {:?}", outcome);
    };
    assert_eq!(resource_id, "django");
    assert!(cause.is(&errors::UNEXPECTED_DRIVER_ERROR));
    assert_eq!(cause.resource_id.as_deref(), Some("django"));

    assert_eq!(world.calls_for("uninstall_incomplete"), vec!["django"]);
    assert_eq!(world.calls_for("uninstall"), vec!["mysql", "host"]);
    assert!(!world.is_installed("mysql"));
    assert_eq!(world.running_count(), 0);
}

#[test]
fn test_upgrade_failure_rolls_back_with_failing_resource_id() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let previous = web_stack("5.0", "1.0");
    let resources = managed(&registry, web_stack("5.1", "1.1"));
    world.fail("django", "upgrade");

    let outcome = InstallSequencer::new(&ctx)
        .upgrade(&resources, &previous, temp.path())
        .unwrap();

    match outcome {
        SequenceOutcome::RollbackSucceeded { resource_id, .. } => assert_eq!(resource_id, "django"),
        other => panic!("expected a successful rollback, got {:?}", other),
    }
    assert_eq!(world.calls_for("upgrade"), vec!["host", "mysql", "django"]);
    assert_eq!(world.calls_for("uninstall_incomplete"), vec!["django"]);
    assert_eq!(world.calls_for("uninstall"), vec!["mysql", "host"]);
    assert!(!world.is_installed("mysql"));
    assert_eq!(world.running_count(), 0);
}

#[test]
fn test_upgrade_validation_failure_also_rolls_back() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let previous = web_stack("5.0", "1.0");
    let resources = managed(&registry, web_stack("5.1", "1.1"));
    world.fail("django", "validate_post_install");

    let outcome = InstallSequencer::new(&ctx)
        .upgrade(&resources, &previous, temp.path())
        .unwrap();
    assert!(matches!(outcome, SequenceOutcome::RollbackSucceeded { .. }));
}

#[test]
fn test_new_resource_during_upgrade_is_installed() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let mut previous = web_stack("5.1", "1.0");
    previous.retain(|r| r.id != "django");
    let resources = managed(&registry, web_stack("5.1", "1.0"));

    let outcome = InstallSequencer::new(&ctx)
        .upgrade(&resources, &previous, temp.path())
        .unwrap();
    assert!(outcome.is_completed());
    assert_eq!(world.calls_for("install"), vec!["django"]);
    assert_eq!(world.calls_for("upgrade"), vec!["host", "mysql"]);
}

#[test]
fn test_failed_rollback_reports_both_causes() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let resources = managed(&registry, web_stack("5.1", "1.0"));
    world.fail("django", "install");
    world.fail("mysql", "uninstall");

    let outcome = InstallSequencer::new(&ctx)
        .install(&resources, InstallOptions::default())
        .unwrap();

    let SequenceOutcome::RollbackFailed {
        resource_id,
        cause,
        rollback_cause,
    } = outcome.clone()
    else {
        panic!("expected a failed rollback, got {:?}", outcome);
    };
    assert_eq!(resource_id, "django");
    assert_eq!(cause.resource_id.as_deref(), Some("django"));
    assert_eq!(rollback_cause.resource_id.as_deref(), Some("mysql"));
    // Rollback keeps going past the failure
    assert_eq!(world.calls_for("uninstall"), vec!["mysql", "host"]);

    let err = outcome.into_install_result().unwrap_err();
    assert!(err.is(&engage_core::user_error::codes::ROLLBACK_FAILED));
    assert!(err.original_error.is_some());
    assert!(err.rollback_error.is_some());
}

#[test]
fn test_pre_install_validation_failure_stops_without_rollback() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let resources = managed(&registry, web_stack("5.1", "1.0"));
    world.fail("django", "validate_pre_install");

    let err = InstallSequencer::new(&ctx)
        .install(&resources, InstallOptions::default())
        .unwrap_err();

    let user = err.downcast_ref::<UserError>().unwrap();
    assert_eq!(user.resource_id.as_deref(), Some("django"));
    assert!(world.calls_for("uninstall").is_empty());
    assert!(world.is_installed("mysql"));
    assert!(!world.calls_for("install").contains(&"django".to_string()));
}

#[test]
fn test_disabled_rollback_leaves_resources_installed() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let resources = managed(&registry, web_stack("5.1", "1.0"));
    world.fail("django", "install");

    let mut sequencer = InstallSequencer::new(&ctx);
    let err = sequencer
        .install(
            &resources,
            InstallOptions {
                rollback_on_failure: false,
            },
        )
        .unwrap_err();

    assert!(err.downcast_ref::<UserError>().is_some());
    assert!(world.is_installed("mysql"));
    assert!(world.is_running("mysql"));
    assert_eq!(sequencer.state("django"), Some(ResourceState::Failed));

    assert_eq!(sequencer.force_stop_all(&resources), 1);
    assert_eq!(world.running_count(), 0);
}

#[test]
fn test_service_that_never_starts_times_out_and_rolls_back() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let resources = managed(&registry, web_stack("5.1", "1.0"));
    world.stick("mysql");

    let outcome = InstallSequencer::new(&ctx)
        .install(&resources, InstallOptions::default())
        .unwrap();

    let SequenceOutcome::RollbackSucceeded { resource_id, cause } = outcome else {
        panic!("expected a successful rollback, got {:?}", outcome);
    };
    assert_eq!(resource_id, "mysql");
    assert!(cause.is(&errors::LIVENESS_TIMEOUT));
    assert_eq!(world.calls_for("uninstall_incomplete"), vec!["mysql"]);
    assert!(world.calls_for("install").iter().all(|id| id != "django"));
}

#[test]
fn test_uninstall_stops_services_first_in_reverse_order() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let resources = managed(&registry, web_stack("5.1", "1.0"));

    let mut sequencer = InstallSequencer::new(&ctx);
    sequencer.install(&resources, InstallOptions::default()).unwrap();
    let report = sequencer.uninstall(&resources, temp.path(), false).unwrap();

    assert_eq!(report.processed, vec!["django", "mysql", "host"]);
    assert_eq!(report.stopped_services, vec!["mysql"]);
    assert!(world.position("stop:mysql").unwrap() < world.position("uninstall:django").unwrap());
    assert_eq!(world.running_count(), 0);
    assert!(!world.is_installed("host"));
}

#[test]
fn test_backup_runs_in_reverse_order_after_stopping_services() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let resources = managed(&registry, web_stack("5.1", "1.0"));

    let mut sequencer = InstallSequencer::new(&ctx);
    sequencer.install(&resources, InstallOptions::default()).unwrap();
    let report = sequencer.backup(&resources, temp.path(), false).unwrap();

    assert_eq!(world.calls_for("backup"), vec!["django", "mysql", "host"]);
    assert_eq!(report.stopped_services, vec!["mysql"]);
    assert!(world.position("stop:mysql").unwrap() < world.position("backup:django").unwrap());

    let started = sequencer
        .start_services(&resources, Some(report.stopped_services.as_slice()))
        .unwrap();
    assert_eq!(started, vec!["mysql"]);
}

#[test]
fn test_restore_runs_in_order_and_starts_services() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let resources = managed(&registry, web_stack("5.1", "1.0"));

    let report = InstallSequencer::new(&ctx).restore(&resources, temp.path(), None).unwrap();

    assert_eq!(report.processed, vec!["host", "mysql", "django"]);
    assert!(world.is_running("mysql"));
}

#[test]
fn test_dry_run_installs_nothing() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp).with_dry_run(true);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let resources = managed(&registry, web_stack("5.1", "1.0"));

    let outcome = InstallSequencer::new(&ctx)
        .install(&resources, InstallOptions::default())
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(world.calls_for("validate_pre_install"), vec!["host", "mysql", "django"]);
    assert!(world.calls_for("install").is_empty());
    assert!(world.calls_for("start").is_empty());
}

#[test]
fn test_events_are_recorded_in_ledger() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context(&temp);
    let world = MockWorld::new();
    let registry = mock_registry(&world);
    let resources = managed(&registry, web_stack("5.1", "1.0"));
    let ledger = engage_install::StatusLedger::new(ctx.home.events_file());

    InstallSequencer::new(&ctx)
        .with_ledger(&ledger)
        .install(&resources, InstallOptions::default())
        .unwrap();

    let last_state = |id: &str| {
        ledger
            .query_events(&EventFilter {
                resource_id: Some(id.to_string()),
                ..EventFilter::default()
            })
            .unwrap()
            .last()
            .map(|e| e.state_after)
    };
    assert_eq!(last_state("django"), Some(ResourceState::Installed));
    assert_eq!(last_state("mysql"), Some(ResourceState::Started));

    let history = ledger
        .query_events(&EventFilter {
            resource_id: Some("mysql".to_string()),
            ..EventFilter::default()
        })
        .unwrap();
    assert_eq!(history[0].event.type_name(), "install_started");
}
