//! Cron-driven rotation runs, one at a time.

use rotation_core::{RunError, RunMode, RunOrchestrator, RunReport};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Runs rotation on a cron schedule, one run at a time.
pub struct RotationScheduler {
    scheduler: Mutex<JobScheduler>,
    orchestrator: Arc<RunOrchestrator>,
    mode: RunMode,
    running: Arc<Mutex<()>>,
}

impl RotationScheduler {
    pub async fn new(orchestrator: Arc<RunOrchestrator>, mode: RunMode) -> crate::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            orchestrator,
            mode,
            running: Arc::new(Mutex::new(())),
        })
    }

    /// Register a run on `cron_expression` (six fields, seconds first).
    pub async fn schedule(&self, cron_expression: &str) -> crate::Result<()> {
        let orchestrator = self.orchestrator.clone();
        let running = self.running.clone();
        let mode = self.mode;

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let orchestrator = orchestrator.clone();
            let running = running.clone();
            Box::pin(async move {
                run_tick(&orchestrator, &running, mode).await;
            })
        })?;

        self.scheduler.lock().await.add(job).await?;
        tracing::info!(cron = %cron_expression, "Rotation scheduled");
        Ok(())
    }

    pub async fn start(&self) -> crate::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    /// Stop scheduling new runs and wait for the current one to finish.
    pub async fn shutdown(&self) -> crate::Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        if self.running.try_lock().is_err() {
            tracing::info!("Waiting for the in-flight rotation run to finish");
        }
        self.wait_idle().await;
        Ok(())
    }

    pub async fn wait_idle(&self) {
        let _idle = self.running.lock().await;
    }
}

/// One scheduled run. Returns `None` when skipped because the previous run
/// still holds `running`.
pub async fn run_tick(
    orchestrator: &RunOrchestrator,
    running: &Arc<Mutex<()>>,
    mode: RunMode,
) -> Option<Result<RunReport, RunError>> {
    let Ok(_guard) = running.clone().try_lock_owned() else {
        tracing::warn!("Skipping scheduled rotation: previous run still in progress");
        return None;
    };

    tracing::info!("Starting scheduled rotation run");
    let result = orchestrator.run(mode).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Scheduled rotation run failed");
    }
    Some(result)
}
