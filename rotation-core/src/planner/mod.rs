//! Pure planning of a run: what to clone and what to retire.
//!
//! Both planners read the same pre-run [`Inventory`](crate::Inventory) and
//! never see each other's output.

pub mod backup;
pub mod expiry;

pub use backup::{plan_backups, BackupPlan, CreateRequest, SkippedCreate};
pub use expiry::{plan_expiry, DeleteRequest};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Everything a run intends to do, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    pub to_create: Vec<CreateRequest>,
    pub to_delete: Vec<DeleteRequest>,
    pub skipped: Vec<SkippedCreate>,
}

impl RunPlan {
    /// Names of the clones this run will create.
    pub fn generated_names(&self) -> HashSet<&str> {
        self.to_create.iter().map(|r| r.backup_name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}
