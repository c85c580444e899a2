//! Error types for the rotator binary.

use rotation_core::{ConfigError, ProviderError, RunError};
use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

#[derive(Error, Debug)]
pub enum RotatorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

pub type Result<T> = std::result::Result<T, RotatorError>;
