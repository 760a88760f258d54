//! Lifecycle event log (`log/events.jsonl`)
//!
//! One JSON envelope per line. Writers take an exclusive lock for the
//! duration of a single line so concurrent engage processes interleave whole
//! records. A line that does not parse, typically the tail of a run that was
//! killed mid-write, is skipped with a warning when reading.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use tracing::warn;

use crate::events::EventEnvelope;

/// Which events to read back
#[derive(Debug, Default)]
pub struct EventFilter {
    pub resource_id: Option<String>,
    /// Event type names such as "install_completed"
    pub event_types: Option<Vec<String>>,
    pub since: Option<DateTime<Utc>>,
    /// Keep only the most recent N matches
    pub limit: Option<usize>,
}

impl EventFilter {
    fn matches(&self, envelope: &EventEnvelope) -> bool {
        let type_name = envelope.event.type_name();
        self.resource_id.as_deref().is_none_or(|id| envelope.resource_id == id)
            && self
                .event_types
                .as_ref()
                .is_none_or(|types| types.iter().any(|t| t == type_name))
            && self.since.is_none_or(|since| envelope.timestamp >= since)
    }
}

#[derive(Debug, Clone)]
pub struct StatusLedger {
    path: PathBuf,
}

impl StatusLedger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append one envelope as a single locked, synced line
    pub fn append(&self, envelope: EventEnvelope) -> Result<()> {
        let mut line = serde_json::to_vec(&envelope).context("Failed to encode event")?;
        line.push(b'\n');

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        // Held until `file` drops
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", self.path.display()))?;
        file.write_all(&line)
            .and_then(|()| file.sync_data())
            .with_context(|| format!("Failed to append to {}", self.path.display()))
    }

    /// Append, logging failures instead of returning them.
    ///
    /// A deployment run never fails because its history could not be written.
    pub fn record(&self, envelope: EventEnvelope) {
        if let Err(e) = self.append(envelope) {
            warn!("Event not recorded: {:#}", e);
        }
    }

    /// Matching events, oldest first
    pub fn query_events(&self, filter: &EventFilter) -> Result<Vec<EventEnvelope>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to open {}", self.path.display())),
        };

        let mut events = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {}", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventEnvelope>(&line) {
                Ok(envelope) if filter.matches(&envelope) => events.push(envelope),
                Ok(_) => {}
                Err(e) => warn!("Skipping line {} of {}: {}", index + 1, self.path.display(), e),
            }
        }

        if let Some(limit) = filter.limit {
            let excess = events.len().saturating_sub(limit);
            events.drain(..excess);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ResourceEvent, ResourceState};
    use std::thread;
    use tempfile::TempDir;

    fn ledger_in(temp: &TempDir) -> StatusLedger {
        StatusLedger::new(temp.path().join("log/events.jsonl"))
    }

    fn started(id: &str) -> EventEnvelope {
        EventEnvelope::new(
            id,
            ResourceState::Pending,
            ResourceEvent::InstallStarted {
                resource_id: id.to_string(),
                key: format!("{} 1.0", id),
            },
        )
    }

    fn completed(id: &str) -> EventEnvelope {
        EventEnvelope::new(
            id,
            ResourceState::Installed,
            ResourceEvent::InstallCompleted {
                resource_id: id.to_string(),
                key: format!("{} 1.0", id),
                duration_secs: 1,
            },
        )
    }

    #[test]
    fn test_filter_by_resource_and_limit() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);
        ledger.append(started("mysql")).unwrap();
        ledger.append(started("django")).unwrap();
        ledger.append(completed("mysql")).unwrap();

        let mysql = EventFilter {
            resource_id: Some("mysql".to_string()),
            ..EventFilter::default()
        };
        let history = ledger.query_events(&mysql).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].event.type_name(), "install_completed");

        let last = ledger
            .query_events(&EventFilter {
                limit: Some(1),
                ..mysql
            })
            .unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].state_after, ResourceState::Installed);
    }

    #[test]
    fn test_filter_by_type() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);
        ledger.append(started("a")).unwrap();
        ledger.append(completed("a")).unwrap();
        ledger.append(completed("b")).unwrap();

        let filter = EventFilter {
            event_types: Some(vec!["install_completed".to_string()]),
            ..EventFilter::default()
        };
        let ids: Vec<_> = ledger
            .query_events(&filter)
            .unwrap()
            .into_iter()
            .map(|e| e.resource_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);
        assert!(ledger.query_events(&EventFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_line_is_skipped() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);
        ledger.append(started("a")).unwrap();

        let mut file = OpenOptions::new().append(true).open(&ledger.path).unwrap();
        file.write_all(b"{\"event_id\": \"trunc").unwrap();
        drop(file);

        let events = ledger.query_events(&EventFilter::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_id, "a");
    }

    #[test]
    fn test_concurrent_appends_keep_whole_lines() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger_in(&temp);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                thread::spawn(move || ledger.append(started(&format!("r{}", i))).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let events = ledger.query_events(&EventFilter::default()).unwrap();
        assert_eq!(events.len(), 8);
    }
}
