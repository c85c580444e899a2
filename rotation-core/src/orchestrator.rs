//! Run orchestration: capture inventory once, clone, then expire.
//!
//! A run walks the [`RunPhase`] state machine in order. Both plans are
//! computed from the single inventory snapshot taken at the start, before
//! anything is mutated, so clones made by a run are never candidates for
//! deletion in that same run and a planning error never leaves a run half
//! executed.
//!
//! Individual clone or delete failures are reported and counted but do not
//! stop the run. Only an inventory failure or a planning error is fatal.

use crate::error::{OperationError, RunError};
use crate::events::{EventSink, RunEvent, RunPhase};
use crate::inventory::{Inventory, TargetMap};
use crate::naming;
use crate::planner::{self, BackupPlan, CreateRequest, DeleteRequest, RunPlan};
use crate::provider::{Placement, ProviderGateway, TaskOutcome};
use crate::retention::RetentionPolicy;
use chrono::{DateTime, Local, NaiveDateTime};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Which phases a run performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMode {
    /// Plan everything, call nothing that mutates
    pub dry_run: bool,
    pub skip_create: bool,
    pub skip_delete: bool,
}

/// Run-wide settings taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub default_retention_days: u32,

    /// Thin-provision clones
    pub sparse: bool,

    /// Maximum provider operations in flight at once
    pub max_concurrent: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            default_retention_days: 7,
            sparse: true,
            max_concurrent: 4,
        }
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub planned_create: usize,
    pub created: usize,
    pub failed_create: usize,
    pub skipped_create: usize,
    pub planned_delete: usize,
    pub deleted: usize,
    pub failed_delete: usize,
}

impl RunSummary {
    pub fn failures(&self) -> usize {
        self.failed_create + self.failed_delete
    }

    pub fn has_failures(&self) -> bool {
        self.failures() > 0
    }
}

/// Everything known about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    /// Minute the run's names and ages are computed against
    pub now: NaiveDateTime,
    pub mode: RunMode,
    pub phases: Vec<RunPhase>,
    pub plan: RunPlan,
    pub summary: RunSummary,
}

pub struct RunOrchestrator {
    provider: Arc<dyn ProviderGateway>,
    targets: TargetMap,
    settings: RunSettings,
    sink: Arc<dyn EventSink>,
}

impl RunOrchestrator {
    pub fn new(
        provider: Arc<dyn ProviderGateway>,
        targets: TargetMap,
        settings: RunSettings,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            provider,
            targets,
            settings,
            sink,
        }
    }

    pub fn targets(&self) -> &TargetMap {
        &self.targets
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Execute one run against the local wall clock.
    pub async fn run(&self, mode: RunMode) -> Result<RunReport, RunError> {
        self.run_at(mode, Local::now().naive_local()).await
    }

    /// Execute one run as if the local wall clock read `now`.
    pub async fn run_at(&self, mode: RunMode, now: NaiveDateTime) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Local::now();
        let now = naming::truncate_to_minute(now);
        let mut tracker = PhaseTracker::new(&run_id, self.sink.as_ref());

        tracing::debug!(run_id = %run_id, ?mode, now = %now, targets = self.targets.len(), "Starting rotation run");

        match self.execute(&run_id, mode, now, &mut tracker).await {
            Ok((plan, summary)) => {
                tracker.advance(RunPhase::Done, summary.failures(), false);
                self.sink.emit(RunEvent::RunCompleted {
                    run_id: run_id.clone(),
                    summary: summary.clone(),
                });
                let phases = tracker.history;
                Ok(RunReport {
                    run_id,
                    started_at,
                    finished_at: Local::now(),
                    now,
                    mode,
                    phases,
                    plan,
                    summary,
                })
            }
            Err(e) => {
                self.sink.emit(RunEvent::RunAborted {
                    run_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run_id: &str,
        mode: RunMode,
        now: NaiveDateTime,
        tracker: &mut PhaseTracker<'_>,
    ) -> Result<(RunPlan, RunSummary), RunError> {
        let guests = self
            .provider
            .list_guests()
            .await
            .map_err(RunError::Inventory)?;
        let inventory = Inventory::new(guests);
        tracker.advance(RunPhase::InventoryCaptured, inventory.len(), false);

        let backups = if mode.skip_create {
            BackupPlan::default()
        } else {
            planner::plan_backups(&inventory, &self.targets, now)?
        };
        let policy = RetentionPolicy::new(self.settings.default_retention_days, now);
        let to_delete = if mode.skip_delete {
            Vec::new()
        } else {
            planner::plan_expiry(&inventory, &self.targets, &policy)?
        };
        let plan = RunPlan {
            to_create: backups.to_create,
            to_delete,
            skipped: backups.skipped,
        };

        let mut summary = RunSummary {
            planned_create: plan.to_create.len(),
            skipped_create: plan.skipped.len(),
            planned_delete: plan.to_delete.len(),
            ..Default::default()
        };

        // Create phase
        tracker.advance(RunPhase::BackupsPlanned, plan.to_create.len(), mode.skip_create);
        for skipped in &plan.skipped {
            self.sink.emit(RunEvent::BackupSkipped {
                run_id: run_id.to_string(),
                source: skipped.source.clone(),
                backup_name: skipped.backup_name.clone(),
                reason: skipped.reason.clone(),
            });
        }
        let creations = plan
            .to_create
            .iter()
            .map(|request| Operation::Create {
                placement: Placement::for_target(&request.target, self.settings.sparse),
                request: request.clone(),
            })
            .collect();
        let outcome = self.dispatch(run_id, mode, creations).await;
        summary.created = outcome.succeeded;
        summary.failed_create = outcome.failed;
        tracker.advance(RunPhase::BackupsExecuted, outcome.total(), mode.skip_create);

        // Expiry phase
        tracker.advance(RunPhase::ExpiryPlanned, plan.to_delete.len(), mode.skip_delete);
        let deletions = plan.to_delete.iter().cloned().map(Operation::Delete).collect();
        let outcome = self.dispatch(run_id, mode, deletions).await;
        summary.deleted = outcome.succeeded;
        summary.failed_delete = outcome.failed;
        tracker.advance(RunPhase::ExpiryExecuted, outcome.total(), mode.skip_delete);

        Ok((plan, summary))
    }

    /// Run `operations` on a bounded worker pool and wait for all of them.
    async fn dispatch(&self, run_id: &str, mode: RunMode, operations: Vec<Operation>) -> PhaseOutcome {
        if mode.dry_run {
            for op in &operations {
                self.sink.emit(op.planned_event(run_id));
            }
            return PhaseOutcome::default();
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(operations.len());

        for op in operations.iter().cloned() {
            let sem = Arc::clone(&semaphore);
            let provider = Arc::clone(&self.provider);
            let sink = Arc::clone(&self.sink);
            let run_id = run_id.to_string();

            handles.push(tokio::spawn(async move {
                let result = match sem.acquire_owned().await {
                    Ok(_permit) => perform(provider.as_ref(), &op).await,
                    Err(e) => Err(OperationError::Aborted(format!("worker pool closed: {e}"))),
                };
                sink.emit(op.outcome_event(&run_id, &result));
                result.is_ok()
            }));
        }

        let mut outcome = PhaseOutcome::default();
        for (op, joined) in operations.iter().zip(join_all(handles).await) {
            match joined {
                Ok(true) => outcome.succeeded += 1,
                Ok(false) => outcome.failed += 1,
                Err(e) => {
                    // The worker died before it could report
                    outcome.failed += 1;
                    let result = Err(OperationError::Aborted(e.to_string()));
                    self.sink.emit(op.outcome_event(run_id, &result));
                }
            }
        }
        outcome
    }
}

#[derive(Debug, Clone)]
enum Operation {
    Create {
        request: CreateRequest,
        placement: Placement,
    },
    Delete(DeleteRequest),
}

impl Operation {
    fn planned_event(&self, run_id: &str) -> RunEvent {
        match self {
            Operation::Create { request, .. } => RunEvent::BackupPlanned {
                run_id: run_id.to_string(),
                source: request.source.name.clone(),
                backup_name: request.backup_name.clone(),
            },
            Operation::Delete(request) => RunEvent::DeletePlanned {
                run_id: run_id.to_string(),
                guest: request.guest.name.clone(),
                age_days: request.age_days,
                retention_days: request.retention_days,
            },
        }
    }

    fn outcome_event(&self, run_id: &str, result: &Result<(), OperationError>) -> RunEvent {
        let run_id = run_id.to_string();
        match (self, result) {
            (Operation::Create { request, .. }, Ok(())) => RunEvent::BackupCreated {
                run_id,
                source: request.source.name.clone(),
                backup_name: request.backup_name.clone(),
            },
            (Operation::Create { request, .. }, Err(e)) => RunEvent::BackupFailed {
                run_id,
                source: request.source.name.clone(),
                backup_name: request.backup_name.clone(),
                error: e.to_string(),
            },
            (Operation::Delete(request), Ok(())) => RunEvent::BackupDeleted {
                run_id,
                guest: request.guest.name.clone(),
                age_days: request.age_days,
                retention_days: request.retention_days,
            },
            (Operation::Delete(request), Err(e)) => RunEvent::DeleteFailed {
                run_id,
                guest: request.guest.name.clone(),
                error: e.to_string(),
            },
        }
    }
}

/// Start the provider task for `op` and wait for its terminal state.
async fn perform(provider: &dyn ProviderGateway, op: &Operation) -> Result<(), OperationError> {
    let task = match op {
        Operation::Create { request, placement } => {
            provider
                .clone_guest(&request.source, &request.backup_name, placement)
                .await?
        }
        Operation::Delete(request) => provider.delete_guest(&request.guest).await?,
    };

    match provider.await_task(&task).await? {
        TaskOutcome::Success => Ok(()),
        TaskOutcome::Failure(reason) => Err(OperationError::TaskFailed(reason)),
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct PhaseOutcome {
    succeeded: usize,
    failed: usize,
}

impl PhaseOutcome {
    fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Walks the run state machine forward and reports each step.
struct PhaseTracker<'a> {
    run_id: &'a str,
    sink: &'a dyn EventSink,
    history: Vec<RunPhase>,
}

impl<'a> PhaseTracker<'a> {
    fn new(run_id: &'a str, sink: &'a dyn EventSink) -> Self {
        Self {
            run_id,
            sink,
            history: vec![RunPhase::Idle],
        }
    }

    fn advance(&mut self, next: RunPhase, items: usize, disabled: bool) {
        debug_assert!(self.history.last().is_some_and(|current| *current < next));
        self.history.push(next);
        self.sink.emit(RunEvent::PhaseChanged {
            run_id: self.run_id.to_string(),
            phase: next,
            items,
            disabled,
        });
    }
}
