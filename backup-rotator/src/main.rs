//! Backup Rotator - Main entry point
//!
//! Clones configured guests and retires expired clones, once or on a cron
//! schedule.

use anyhow::{Context, Result};
use backup_rotator::config::RotatorConfig;
use backup_rotator::daemon::{RotationScheduler, ShutdownCoordinator};
use backup_rotator::{utils, HttpProvider};
use clap::Parser;
use rotation_core::{ConfigError, RunMode, RunOrchestrator, TracingSink};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Exit status when the run finished but some clones or deletes failed
const EXIT_OPERATION_FAILURES: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Plan and report, but create and delete nothing
    #[arg(long)]
    dry_run: bool,

    /// Skip the clone phase
    #[arg(long)]
    no_create: bool,

    /// Skip the expiry phase
    #[arg(long)]
    no_delete: bool,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Keep running and rotate on `backup.schedule`
    #[arg(long, conflicts_with = "json")]
    daemon: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            // The logger may not be up yet
            eprintln!("backup-rotator: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let mut config = RotatorConfig::from_file(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    config.apply_env_overrides()?;

    // Initialize logging
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_deref().unwrap_or(&config.log.level)
    };
    utils::logger::init(log_level)?;

    let targets = config.validate().context("invalid configuration")?;
    if args.check_config {
        tracing::info!(targets = targets.len(), "Configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }

    let provider = Arc::new(HttpProvider::new(&config.provider)?);
    let orchestrator = Arc::new(RunOrchestrator::new(
        provider,
        targets,
        config.run_settings(),
        Arc::new(TracingSink),
    ));
    log_startup(&orchestrator);

    let mode = RunMode {
        dry_run: args.dry_run,
        skip_create: args.no_create,
        skip_delete: args.no_delete,
    };

    if args.daemon {
        let schedule = config
            .backup
            .schedule
            .clone()
            .ok_or(ConfigError::MissingSetting("backup.schedule"))?;
        run_daemon(orchestrator, mode, &schedule).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let report = orchestrator.run(mode).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if report.summary.has_failures() {
        Ok(ExitCode::from(EXIT_OPERATION_FAILURES))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn log_startup(orchestrator: &RunOrchestrator) {
    let settings = orchestrator.settings();
    tracing::info!(
        "Starting backup-rotator v{} ({} targets, retention {} days, {} concurrent operations)",
        env!("CARGO_PKG_VERSION"),
        orchestrator.targets().len(),
        settings.default_retention_days,
        settings.max_concurrent
    );
    for target in orchestrator.targets().iter() {
        tracing::debug!(
            guest = %target.base_name,
            datastore = %target.datastore,
            cluster = %target.cluster,
            folder = %target.folder,
            retention_days = ?target.retention_days,
            "Backup target"
        );
    }
}

async fn run_daemon(orchestrator: Arc<RunOrchestrator>, mode: RunMode, schedule: &str) -> Result<()> {
    let scheduler = RotationScheduler::new(orchestrator, mode).await?;
    scheduler.schedule(schedule).await?;
    scheduler.start().await?;
    tracing::info!(cron = %schedule, "Daemon started, waiting for scheduled runs");

    let shutdown = ShutdownCoordinator::new();
    shutdown.wait_for_signal().await;

    scheduler.shutdown().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
