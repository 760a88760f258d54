use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a resource stands in the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Pending,
    Validated,
    Installed,
    Started,
    Stopped,
    BackedUp,
    Uninstalled,
    Restored,
    Failed,
}

/// Resource lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceEvent {
    InstallStarted {
        resource_id: String,
        key: String,
    },

    InstallCompleted {
        resource_id: String,
        key: String,
        duration_secs: u64,
    },

    InstallFailed {
        resource_id: String,
        key: String,
        error_message: String,
    },

    /// Already present; nothing was done
    InstallSkipped {
        resource_id: String,
        key: String,
    },

    UpgradeStarted {
        resource_id: String,
        from_version: String,
        to_version: String,
    },

    UpgradeCompleted {
        resource_id: String,
        from_version: String,
        to_version: String,
        duration_secs: u64,
    },

    ServiceStarted {
        resource_id: String,
    },

    ServiceStopped {
        resource_id: String,
        forced: bool,
    },

    BackupCompleted {
        resource_id: String,
        backup_dir: String,
    },

    UninstallCompleted {
        resource_id: String,
        incomplete_install: bool,
    },

    RestoreCompleted {
        resource_id: String,
        backup_dir: String,
    },

    RollbackStarted {
        failed_resource: String,
        error_message: String,
    },

    RollbackCompleted {
        failed_resource: String,
    },

    RollbackFailed {
        failed_resource: String,
        error_message: String,
    },
}

impl ResourceEvent {
    /// Snake-case type tag, as written to the ledger
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceEvent::InstallStarted { .. } => "install_started",
            ResourceEvent::InstallCompleted { .. } => "install_completed",
            ResourceEvent::InstallFailed { .. } => "install_failed",
            ResourceEvent::InstallSkipped { .. } => "install_skipped",
            ResourceEvent::UpgradeStarted { .. } => "upgrade_started",
            ResourceEvent::UpgradeCompleted { .. } => "upgrade_completed",
            ResourceEvent::ServiceStarted { .. } => "service_started",
            ResourceEvent::ServiceStopped { .. } => "service_stopped",
            ResourceEvent::BackupCompleted { .. } => "backup_completed",
            ResourceEvent::UninstallCompleted { .. } => "uninstall_completed",
            ResourceEvent::RestoreCompleted { .. } => "restore_completed",
            ResourceEvent::RollbackStarted { .. } => "rollback_started",
            ResourceEvent::RollbackCompleted { .. } => "rollback_completed",
            ResourceEvent::RollbackFailed { .. } => "rollback_failed",
        }
    }
}

/// Event metadata envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID (UUID v4)
    pub event_id: String,

    pub timestamp: DateTime<Utc>,

    /// Resource the event is about (for indexing)
    pub resource_id: String,

    /// Engine version that published the event
    pub engine_version: String,

    pub state_after: ResourceState,

    pub event: ResourceEvent,
}

impl EventEnvelope {
    pub fn new(resource_id: impl Into<String>, state_after: ResourceState, event: ResourceEvent) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            resource_id: resource_id.into(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            state_after,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ResourceEvent::UpgradeStarted {
            resource_id: "mysql".to_string(),
            from_version: "5.0".to_string(),
            to_version: "5.1".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"upgrade_started""#));
        assert_eq!(event.type_name(), "upgrade_started");

        let back: ResourceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_envelope_has_unique_ids() {
        let a = EventEnvelope::new(
            "host",
            ResourceState::Installed,
            ResourceEvent::InstallSkipped {
                resource_id: "host".to_string(),
                key: "ubuntu 22.04".to_string(),
            },
        );
        let b = EventEnvelope::new("host", ResourceState::Installed, a.event.clone());
        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.engine_version, env!("CARGO_PKG_VERSION"));
    }
}
