//! Guests, the per-run inventory snapshot and the backup target map.

use crate::error::{ConfigError, PlanError};
use crate::naming::{self, BackupLineage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Opaque provider identifier for a guest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestHandle(pub String);

/// A virtual machine as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub name: String,
    pub handle: GuestHandle,
}

impl Guest {
    pub fn new(name: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: GuestHandle(handle.into()),
        }
    }

    /// Backup lineage if this guest's name follows the backup convention.
    pub fn lineage(&self) -> Option<BackupLineage> {
        naming::decode(&self.name)
    }
}

/// Guest list captured once at the start of a run. Never refreshed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    guests: Vec<Guest>,
}

impl Inventory {
    pub fn new(guests: Vec<Guest>) -> Self {
        Self { guests }
    }

    pub fn guests(&self) -> &[Guest] {
        &self.guests
    }

    pub fn names(&self) -> HashSet<&str> {
        self.guests.iter().map(|g| g.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.guests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guests.is_empty()
    }
}

/// Where and how long to keep backups of one source guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupTarget {
    /// Exact name of the source guest
    pub base_name: String,

    pub datastore: String,
    pub cluster: String,
    pub folder: String,

    /// Overrides the run-wide retention period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
}

/// Validated set of backup targets, keyed by base name.
#[derive(Debug, Clone, Default)]
pub struct TargetMap {
    targets: Vec<BackupTarget>,
}

impl TargetMap {
    /// Build the map, rejecting duplicate base names and base names that
    /// could never be a source (empty, or themselves backup names).
    pub fn new(targets: Vec<BackupTarget>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for target in &targets {
            if target.base_name.trim().is_empty() {
                return Err(ConfigError::InvalidTarget {
                    name: target.base_name.clone(),
                    reason: "base name is empty".to_string(),
                });
            }
            if naming::is_backup_name(&target.base_name) {
                return Err(ConfigError::InvalidTarget {
                    name: target.base_name.clone(),
                    reason: "base name is itself a backup name".to_string(),
                });
            }
            if !seen.insert(target.base_name.as_str()) {
                return Err(ConfigError::DuplicateTarget(target.base_name.clone()));
            }
        }
        Ok(Self { targets })
    }

    /// Exact-key lookup. More than one match is reported, never guessed.
    pub fn resolve(&self, base_name: &str) -> Result<Option<&BackupTarget>, PlanError> {
        let mut matches = self.targets.iter().filter(|t| t.base_name == base_name);
        let first = matches.next();
        let extra = matches.count();
        if extra > 0 {
            return Err(PlanError::AmbiguousTarget {
                base_name: base_name.to_string(),
                count: extra + 1,
            });
        }
        Ok(first)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackupTarget> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
