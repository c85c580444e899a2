//! Structured run events.
//!
//! The orchestrator reports progress as [`RunEvent`]s through an injected
//! [`EventSink`]. Planning code never logs; everything observable about a
//! run goes through here.

use crate::orchestrator::RunSummary;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Run state machine, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    InventoryCaptured,
    BackupsPlanned,
    BackupsExecuted,
    ExpiryPlanned,
    ExpiryExecuted,
    Done,
}

/// Events emitted during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RunEvent {
    #[serde(rename = "run:phase")]
    PhaseChanged {
        run_id: String,
        phase: RunPhase,
        /// Items planned or processed in this phase
        items: usize,
        #[serde(default)]
        disabled: bool,
    },

    #[serde(rename = "backup:skipped")]
    BackupSkipped {
        run_id: String,
        source: String,
        backup_name: String,
        reason: String,
    },

    #[serde(rename = "backup:created")]
    BackupCreated {
        run_id: String,
        source: String,
        backup_name: String,
    },

    #[serde(rename = "backup:failed")]
    BackupFailed {
        run_id: String,
        source: String,
        backup_name: String,
        error: String,
    },

    /// Dry-run stand-in for a clone
    #[serde(rename = "backup:planned")]
    BackupPlanned {
        run_id: String,
        source: String,
        backup_name: String,
    },

    #[serde(rename = "expiry:deleted")]
    BackupDeleted {
        run_id: String,
        guest: String,
        age_days: i64,
        retention_days: u32,
    },

    #[serde(rename = "expiry:failed")]
    DeleteFailed {
        run_id: String,
        guest: String,
        error: String,
    },

    /// Dry-run stand-in for a delete
    #[serde(rename = "expiry:planned")]
    DeletePlanned {
        run_id: String,
        guest: String,
        age_days: i64,
        retention_days: u32,
    },

    #[serde(rename = "run:completed")]
    RunCompleted { run_id: String, summary: RunSummary },

    #[serde(rename = "run:aborted")]
    RunAborted { run_id: String, error: String },
}

impl RunEvent {
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::PhaseChanged { run_id, .. }
            | RunEvent::BackupSkipped { run_id, .. }
            | RunEvent::BackupCreated { run_id, .. }
            | RunEvent::BackupFailed { run_id, .. }
            | RunEvent::BackupPlanned { run_id, .. }
            | RunEvent::BackupDeleted { run_id, .. }
            | RunEvent::DeleteFailed { run_id, .. }
            | RunEvent::DeletePlanned { run_id, .. }
            | RunEvent::RunCompleted { run_id, .. }
            | RunEvent::RunAborted { run_id, .. } => run_id,
        }
    }
}

/// Receiver of run events. Must not block: it is called from worker tasks.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

/// Writes every event as a `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: RunEvent) {
        match event {
            RunEvent::PhaseChanged { run_id, phase, items, disabled } => {
                if disabled {
                    info!(run_id = %run_id, ?phase, "Phase disabled for this run");
                } else {
                    debug!(run_id = %run_id, ?phase, items, "Run phase reached");
                }
            }
            RunEvent::BackupSkipped { run_id, source, backup_name, reason } => {
                warn!(run_id = %run_id, guest = %source, backup = %backup_name, "Backup skipped: {}", reason);
            }
            RunEvent::BackupCreated { run_id, source, backup_name } => {
                info!(run_id = %run_id, guest = %source, backup = %backup_name, "Backup created");
            }
            RunEvent::BackupFailed { run_id, source, backup_name, error } => {
                error!(run_id = %run_id, guest = %source, backup = %backup_name, error = %error, "Backup failed");
            }
            RunEvent::BackupPlanned { run_id, source, backup_name } => {
                info!(run_id = %run_id, guest = %source, backup = %backup_name, "[dry-run] Would create backup");
            }
            RunEvent::BackupDeleted { run_id, guest, age_days, retention_days } => {
                info!(run_id = %run_id, guest = %guest, age_days, retention_days, "Expired backup deleted");
            }
            RunEvent::DeleteFailed { run_id, guest, error } => {
                error!(run_id = %run_id, guest = %guest, error = %error, "Failed to delete expired backup");
            }
            RunEvent::DeletePlanned { run_id, guest, age_days, retention_days } => {
                info!(run_id = %run_id, guest = %guest, age_days, retention_days, "[dry-run] Would delete expired backup");
            }
            RunEvent::RunCompleted { run_id, summary } => {
                let failures = summary.failures();
                if failures > 0 {
                    warn!(
                        run_id = %run_id,
                        created = summary.created,
                        failed_create = summary.failed_create,
                        deleted = summary.deleted,
                        failed_delete = summary.failed_delete,
                        "Rotation run finished with {} failed operation(s)", failures
                    );
                } else {
                    info!(
                        run_id = %run_id,
                        created = summary.created,
                        skipped_create = summary.skipped_create,
                        deleted = summary.deleted,
                        "Rotation run finished"
                    );
                }
            }
            RunEvent::RunAborted { run_id, error } => {
                error!(run_id = %run_id, error = %error, "Rotation run aborted");
            }
        }
    }
}

/// Maximum number of queued events per subscriber
const CHANNEL_CAPACITY: usize = 1024;

/// Fans events out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<RunEvent>,
}

impl ChannelSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: RunEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

/// Sends each event to every inner sink, in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: RunEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = RunEvent::BackupCreated {
            run_id: "run-1".to_string(),
            source: "web1".to_string(),
            backup_name: "web1-backup-2020-01-01T00:00".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"backup:created""#));
        assert!(json.contains("web1-backup-2020-01-01T00:00"));
    }

    #[test]
    fn test_phase_serialization() {
        let json = r#"{"type":"run:phase","payload":{"run_id":"r","phase":"expiry_planned","items":3}}"#;
        let event: RunEvent = serde_json::from_str(json).unwrap();

        match event {
            RunEvent::PhaseChanged { phase, items, disabled, .. } => {
                assert_eq!(phase, RunPhase::ExpiryPlanned);
                assert_eq!(items, 3);
                assert!(!disabled);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_phases_are_ordered() {
        assert!(RunPhase::Idle < RunPhase::InventoryCaptured);
        assert!(RunPhase::BackupsExecuted < RunPhase::ExpiryPlanned);
        assert!(RunPhase::ExpiryExecuted < RunPhase::Done);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_to_subscribers() {
        let sink = ChannelSink::new();
        let mut rx = sink.subscribe();

        sink.emit(RunEvent::RunAborted {
            run_id: "run-2".to_string(),
            error: "boom".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.run_id(), "run-2");
    }

    #[test]
    fn test_fanout_sink() {
        let a = std::sync::Arc::new(ChannelSink::new());
        let b = std::sync::Arc::new(ChannelSink::new());
        let mut rx_a = a.subscribe();
        let mut rx_b = b.subscribe();
        let sinks: Vec<std::sync::Arc<dyn EventSink>> =
            vec![a.clone(), b.clone(), std::sync::Arc::new(TracingSink)];
        let fanout = FanoutSink::new(sinks);

        fanout.emit(RunEvent::RunAborted {
            run_id: "run-3".to_string(),
            error: "boom".to_string(),
        });

        assert_eq!(rx_a.try_recv().unwrap().run_id(), "run-3");
        assert_eq!(rx_b.try_recv().unwrap().run_id(), "run-3");
    }
}
