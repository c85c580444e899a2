//! In-memory provider gateway for tests.
//!
//! Clones and deletes take effect on the mock's guest list when their task
//! succeeds, so consecutive runs see each other's work.

use crate::inventory::Guest;
use crate::provider::{Placement, ProviderError, ProviderGateway, TaskHandle, TaskOutcome};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A provider call as the mock received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    ListGuests,
    CloneGuest {
        source: String,
        new_name: String,
        placement: Placement,
    },
    DeleteGuest {
        name: String,
    },
    AwaitTask {
        task: String,
    },
}

#[derive(Debug, Default)]
pub struct MockProvider {
    guests: Mutex<Vec<Guest>>,
    calls: Mutex<Vec<ProviderCall>>,
    tasks: Mutex<HashMap<String, PendingTask>>,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    task_delay: Option<Duration>,
    failing_clone: HashSet<String>,
    rejecting_clone: HashSet<String>,
    failing_delete: HashSet<String>,
    unavailable: bool,
}

#[derive(Debug, Clone)]
enum PendingTask {
    Clone { new_name: String, fail: bool },
    Delete { name: String, fail: bool },
}

impl MockProvider {
    pub fn with_guests(names: &[&str]) -> Self {
        let guests = names
            .iter()
            .enumerate()
            .map(|(i, name)| Guest::new(*name, format!("vm-{i}")))
            .collect();
        Self {
            guests: Mutex::new(guests),
            ..Default::default()
        }
    }

    /// Clones of `source` start but their task ends in failure.
    pub fn failing_clone(mut self, source: &str) -> Self {
        self.failing_clone.insert(source.to_string());
        self
    }

    /// Clones of `source` are refused outright.
    pub fn rejecting_clone(mut self, source: &str) -> Self {
        self.rejecting_clone.insert(source.to_string());
        self
    }

    pub fn failing_delete(mut self, name: &str) -> Self {
        self.failing_delete.insert(name.to_string());
        self
    }

    /// Every call fails as if the control plane were down.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Tasks take `delay` to reach their terminal state.
    pub fn with_task_delay(mut self, delay: Duration) -> Self {
        self.task_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().expect("mock calls lock").clone()
    }

    /// Names requested for new clones, in call order.
    pub fn clone_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ProviderCall::CloneGuest { new_name, .. } => Some(new_name),
                _ => None,
            })
            .collect()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ProviderCall::DeleteGuest { name } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Current guest names, in listing order.
    pub fn guest_names(&self) -> Vec<String> {
        self.guests
            .lock()
            .expect("mock guests lock")
            .iter()
            .map(|g| g.name.clone())
            .collect()
    }

    /// Highest number of tasks that were started but not yet awaited.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: ProviderCall) -> Result<(), ProviderError> {
        self.calls.lock().expect("mock calls lock").push(call);
        if self.unavailable {
            return Err(ProviderError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn start(&self, task: PendingTask) -> TaskHandle {
        let id = format!("task-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.tasks
            .lock()
            .expect("mock tasks lock")
            .insert(id.clone(), task);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        TaskHandle(id)
    }
}

#[async_trait]
impl ProviderGateway for MockProvider {
    async fn list_guests(&self) -> Result<Vec<Guest>, ProviderError> {
        self.record(ProviderCall::ListGuests)?;
        Ok(self.guests.lock().expect("mock guests lock").clone())
    }

    async fn clone_guest(
        &self,
        source: &Guest,
        new_name: &str,
        placement: &Placement,
    ) -> Result<TaskHandle, ProviderError> {
        self.record(ProviderCall::CloneGuest {
            source: source.name.clone(),
            new_name: new_name.to_string(),
            placement: placement.clone(),
        })?;
        if self.rejecting_clone.contains(&source.name) {
            return Err(ProviderError::Rejected(format!("clone of {} not permitted", source.name)));
        }
        Ok(self.start(PendingTask::Clone {
            new_name: new_name.to_string(),
            fail: self.failing_clone.contains(&source.name),
        }))
    }

    async fn delete_guest(&self, guest: &Guest) -> Result<TaskHandle, ProviderError> {
        self.record(ProviderCall::DeleteGuest {
            name: guest.name.clone(),
        })?;
        Ok(self.start(PendingTask::Delete {
            name: guest.name.clone(),
            fail: self.failing_delete.contains(&guest.name),
        }))
    }

    async fn await_task(&self, task: &TaskHandle) -> Result<TaskOutcome, ProviderError> {
        self.record(ProviderCall::AwaitTask {
            task: task.0.clone(),
        })?;
        if let Some(delay) = self.task_delay {
            tokio::time::sleep(delay).await;
        }

        let pending = self
            .tasks
            .lock()
            .expect("mock tasks lock")
            .remove(&task.0)
            .ok_or_else(|| ProviderError::Protocol(format!("unknown task {}", task.0)))?;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut guests = self.guests.lock().expect("mock guests lock");
        let outcome = match pending {
            PendingTask::Clone { fail: true, .. } => {
                TaskOutcome::Failure("insufficient space on datastore".to_string())
            }
            PendingTask::Clone { new_name, .. } => {
                let handle = format!("vm-clone-{}", guests.len());
                guests.push(Guest::new(new_name, handle));
                TaskOutcome::Success
            }
            PendingTask::Delete { fail: true, .. } => {
                TaskOutcome::Failure("guest is locked".to_string())
            }
            PendingTask::Delete { name, .. } => {
                guests.retain(|g| g.name != name);
                TaskOutcome::Success
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clone_appears_after_task_completes() {
        let mock = MockProvider::with_guests(&["web1"]);
        let guests = mock.list_guests().await.unwrap();
        let placement = Placement {
            datastore: "ds1".to_string(),
            cluster: "cl1".to_string(),
            folder: "Backups".to_string(),
            sparse: true,
        };

        let task = mock.clone_guest(&guests[0], "web1-copy", &placement).await.unwrap();
        assert_eq!(mock.guest_names(), ["web1"]);
        assert_eq!(mock.await_task(&task).await.unwrap(), TaskOutcome::Success);
        assert_eq!(mock.guest_names(), ["web1", "web1-copy"]);
    }

    #[tokio::test]
    async fn test_unknown_task_is_a_protocol_error() {
        let mock = MockProvider::with_guests(&[]);
        let err = mock.await_task(&TaskHandle("nope".to_string())).await.unwrap_err();
        assert!(matches!(err, ProviderError::Protocol(_)));
    }
}
