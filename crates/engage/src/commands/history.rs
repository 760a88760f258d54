//! Lifecycle event history

use anyhow::{Context, Result};
use engage_install::ledger::EventFilter;
use engage_install::{EventEnvelope, ResourceEvent, StatusLedger};
use tabled::{settings::Style, Table, Tabled};

use super::resolve_home;
use crate::cli::{GlobalArgs, HistoryArgs};
use crate::output;

#[derive(Tabled)]
struct EventRow {
    time: String,
    resource: String,
    event: String,
    state: String,
    detail: String,
}

pub fn run(args: HistoryArgs, global: &GlobalArgs) -> Result<()> {
    let home = resolve_home(global)?;
    let ledger = StatusLedger::new(home.events_file());

    let events = ledger
        .query_events(&EventFilter {
            resource_id: args.resource,
            limit: Some(args.limit),
            ..EventFilter::default()
        })
        .context("Failed to read event history")?;

    if events.is_empty() {
        output::info("No events recorded");
        return Ok(());
    }

    let rows: Vec<EventRow> = events.iter().map(event_row).collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}

fn event_row(envelope: &EventEnvelope) -> EventRow {
    EventRow {
        time: envelope.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        resource: envelope.resource_id.clone(),
        event: envelope.event.type_name().replace('_', " "),
        state: format!("{:?}", envelope.state_after).to_lowercase(),
        detail: event_detail(&envelope.event),
    }
}

fn event_detail(event: &ResourceEvent) -> String {
    match event {
        ResourceEvent::InstallStarted { key, .. } | ResourceEvent::InstallSkipped { key, .. } => key.clone(),
        ResourceEvent::InstallCompleted { key, duration_secs, .. } => format!("{} ({}s)", key, duration_secs),
        ResourceEvent::InstallFailed { error_message, .. } => error_message.clone(),
        ResourceEvent::UpgradeStarted {
            from_version,
            to_version,
            ..
        } => format!("{} -> {}", from_version, to_version),
        ResourceEvent::UpgradeCompleted {
            from_version,
            to_version,
            duration_secs,
            ..
        } => format!("{} -> {} ({}s)", from_version, to_version, duration_secs),
        ResourceEvent::ServiceStarted { .. } => String::new(),
        ResourceEvent::ServiceStopped { forced, .. } => {
            if *forced {
                "forced".to_string()
            } else {
                String::new()
            }
        }
        ResourceEvent::BackupCompleted { backup_dir, .. } | ResourceEvent::RestoreCompleted { backup_dir, .. } => {
            backup_dir.clone()
        }
        ResourceEvent::UninstallCompleted {
            incomplete_install, ..
        } => {
            if *incomplete_install {
                "incomplete install".to_string()
            } else {
                String::new()
            }
        }
        ResourceEvent::RollbackStarted { error_message, .. } | ResourceEvent::RollbackFailed { error_message, .. } => {
            error_message.clone()
        }
        ResourceEvent::RollbackCompleted { failed_resource } => format!("after {}", failed_resource),
    }
}
