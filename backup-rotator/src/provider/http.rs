//! JSON control-plane gateway over HTTP with basic auth.
//!
//! Endpoints, relative to `provider.server`:
//! - `GET    /guests`             list guests
//! - `POST   /guests/{id}/clone`  start a clone task
//! - `DELETE /guests/{id}`        start a delete task
//! - `GET    /tasks/{id}`         task status

use crate::config::ProviderConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use rotation_core::{Guest, Placement, ProviderError, ProviderGateway, TaskHandle, TaskOutcome};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Per-request timeout, separate from the task wait deadline
const REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct HttpProvider {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    poll_interval: Duration,
    task_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GuestRecord {
    name: String,
    id: String,
}

#[derive(Debug, Serialize)]
struct CloneBody<'a> {
    name: &'a str,
    datastore: &'a str,
    cluster: &'a str,
    folder: &'a str,
    sparse: bool,
}

#[derive(Debug, Deserialize)]
struct TaskAccepted {
    task_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    state: TaskState,
    #[serde(default)]
    error: Option<String>,
}

impl TaskStatus {
    /// Terminal outcome, or `None` while the task is still going.
    fn into_outcome(self) -> Option<TaskOutcome> {
        match self.state {
            TaskState::Queued | TaskState::Running => None,
            TaskState::Success => Some(TaskOutcome::Success),
            TaskState::Error => Some(TaskOutcome::Failure(
                self.error
                    .unwrap_or_else(|| "task failed without a reason".to_string()),
            )),
        }
    }
}

impl HttpProvider {
    /// Build the client. No request is made until the first call.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        if config.insecure {
            warn!("TLS certificate verification is disabled for the control plane");
        }

        Ok(Self {
            client,
            base_url: config.server.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            poll_interval: Duration::from_secs(config.task_poll_interval_secs.max(1)),
            task_timeout: Duration::from_secs(config.task_timeout_secs),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(classify(status, &body));
        }
        decode(&body)
    }

    /// Poll `task` until it reaches a terminal state. Unbounded; callers
    /// apply the task deadline.
    async fn poll_task(&self, task: &TaskHandle) -> Result<TaskOutcome, ProviderError> {
        let url = self.url(&format!("/tasks/{}", task.0));
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            ticker.tick().await;
            match self.send::<TaskStatus>(self.client.get(&url)).await {
                Ok(status) => {
                    if let Some(outcome) = status.into_outcome() {
                        return Ok(outcome);
                    }
                }
                // Keep polling through blips until the deadline
                Err(ProviderError::Unavailable(e)) => {
                    warn!(task = %task.0, error = %e, "Task status poll failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn start_task(&self, request: RequestBuilder) -> Result<TaskHandle, ProviderError> {
        let accepted: TaskAccepted = self.send(request).await?;
        Ok(TaskHandle(accepted.task_id))
    }
}

#[async_trait]
impl ProviderGateway for HttpProvider {
    async fn list_guests(&self) -> Result<Vec<Guest>, ProviderError> {
        let records: Vec<GuestRecord> = self.send(self.client.get(self.url("/guests"))).await?;
        debug!(count = records.len(), "Guest inventory fetched");
        Ok(records
            .into_iter()
            .map(|r| Guest::new(r.name, r.id))
            .collect())
    }

    async fn clone_guest(
        &self,
        source: &Guest,
        new_name: &str,
        placement: &Placement,
    ) -> Result<TaskHandle, ProviderError> {
        let body = CloneBody {
            name: new_name,
            datastore: &placement.datastore,
            cluster: &placement.cluster,
            folder: &placement.folder,
            sparse: placement.sparse,
        };
        let url = self.url(&format!("/guests/{}/clone", source.handle.0));
        let task = self.start_task(self.client.post(url).json(&body)).await?;
        debug!(guest = %source.name, backup = %new_name, task = %task.0, "Clone task started");
        Ok(task)
    }

    async fn delete_guest(&self, guest: &Guest) -> Result<TaskHandle, ProviderError> {
        let url = self.url(&format!("/guests/{}", guest.handle.0));
        let task = self.start_task(self.client.delete(url)).await?;
        debug!(guest = %guest.name, task = %task.0, "Delete task started");
        Ok(task)
    }

    async fn await_task(&self, task: &TaskHandle) -> Result<TaskOutcome, ProviderError> {
        // The deadline covers status requests still in flight, not just the
        // gaps between them.
        tokio::time::timeout(self.task_timeout, self.poll_task(task))
            .await
            .map_err(|_| ProviderError::Timeout(self.task_timeout))?
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(e.to_string())
}

/// Map a non-success HTTP status to a provider error.
fn classify(status: StatusCode, body: &str) -> ProviderError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };

    if status.is_server_error() {
        ProviderError::Unavailable(detail)
    } else if status.is_client_error() {
        ProviderError::Rejected(detail)
    } else {
        ProviderError::Protocol(format!("unexpected status {detail}"))
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Protocol(format!("malformed response body: {e}")))
}
