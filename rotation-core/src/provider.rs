//! Provider gateway: the virtualization control plane as seen by a run.
//!
//! Clone and delete return a handle to an in-progress provider task; callers
//! wait for its terminal state with [`ProviderGateway::await_task`].

use crate::inventory::{BackupTarget, Guest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider rejected request: {0}")]
    Rejected(String),

    #[error("Provider task did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Unexpected provider response: {0}")]
    Protocol(String),
}

/// Where a clone is placed and whether its disks are thin-provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub datastore: String,
    pub cluster: String,
    pub folder: String,
    pub sparse: bool,
}

impl Placement {
    pub fn for_target(target: &BackupTarget, sparse: bool) -> Self {
        Self {
            datastore: target.datastore.clone(),
            cluster: target.cluster.clone(),
            folder: target.folder.clone(),
            sparse,
        }
    }
}

/// Provider-side identifier of an asynchronous task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(pub String);

/// Terminal state of a provider task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Success,
    Failure(String),
}

#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn list_guests(&self) -> Result<Vec<Guest>, ProviderError>;

    async fn clone_guest(
        &self,
        source: &Guest,
        new_name: &str,
        placement: &Placement,
    ) -> Result<TaskHandle, ProviderError>;

    async fn delete_guest(&self, guest: &Guest) -> Result<TaskHandle, ProviderError>;

    /// Wait for `task` to succeed or fail. Implementations bound the wait and
    /// report [`ProviderError::Timeout`] past it.
    async fn await_task(&self, task: &TaskHandle) -> Result<TaskOutcome, ProviderError>;
}
