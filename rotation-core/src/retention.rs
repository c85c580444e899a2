//! Backup age and expiry rules.

use crate::inventory::BackupTarget;
use crate::naming::{self, BackupLineage};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Elapsed time since `created_at`. Backups stamped in the future (clock skew)
/// have age zero and are never expired by it.
pub fn age(created_at: NaiveDateTime, now: NaiveDateTime) -> Duration {
    let elapsed = now - created_at;
    if elapsed < Duration::zero() {
        Duration::zero()
    } else {
        elapsed
    }
}

/// Whole elapsed days, truncated, compared inclusively: a backup exactly
/// `retention_days` old is expired.
pub fn is_expired(age: Duration, retention_days: u32) -> bool {
    age.num_days() >= i64::from(retention_days)
}

/// Run-wide retention settings, fixed at the start of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub default_days: u32,
    pub now: NaiveDateTime,
}

impl RetentionPolicy {
    pub fn new(default_days: u32, now: NaiveDateTime) -> Self {
        Self {
            default_days,
            now: naming::truncate_to_minute(now),
        }
    }

    /// Retention for `target`: its own override, else the run-wide default.
    pub fn effective_days(&self, target: &BackupTarget) -> u32 {
        target.retention_days.unwrap_or(self.default_days)
    }

    pub fn age_of(&self, lineage: &BackupLineage) -> Duration {
        age(lineage.created_at, self.now)
    }
}
