//! Error types for the rotation engine.

use crate::provider::ProviderError;
use thiserror::Error;

/// Invalid or incomplete configuration. Always fatal, raised before any
/// provider call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    #[error("Duplicate backup target: {0}")]
    DuplicateTarget(String),

    #[error("Invalid backup target '{name}': {reason}")]
    InvalidTarget { name: String, reason: String },
}

/// Inconsistency detected while planning a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Generated backup name '{0}' would be created twice in one run")]
    DuplicateBackupName(String),

    #[error("Base name '{base_name}' resolves to {count} backup targets")]
    AmbiguousTarget { base_name: String, count: usize },
}

/// Failure of a single clone or delete. Counted, never fatal to the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Provider task failed: {0}")]
    TaskFailed(String),

    #[error("Worker aborted: {0}")]
    Aborted(String),
}

/// Fatal run errors. Nothing has been mutated when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("Inventory capture failed: {0}")]
    Inventory(#[source] ProviderError),

    #[error("Planning failed: {0}")]
    Plan(#[from] PlanError),
}
