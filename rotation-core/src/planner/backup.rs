use crate::error::PlanError;
use crate::inventory::{BackupTarget, Guest, Inventory, TargetMap};
use crate::naming;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Clone `source` to a new guest named `backup_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub source: Guest,
    pub target: BackupTarget,
    pub backup_name: String,
}

/// A source that was eligible but whose backup name is already taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCreate {
    pub source: String,
    pub backup_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupPlan {
    pub to_create: Vec<CreateRequest>,
    pub skipped: Vec<SkippedCreate>,
}

/// Every live guest listed in `targets` gets one new backup named for `now`.
///
/// Guests whose names decode as backups are never sources. Output follows
/// inventory order. A generated name that already exists in the inventory
/// (a second run inside the same minute) is skipped rather than cloned.
pub fn plan_backups(
    inventory: &Inventory,
    targets: &TargetMap,
    now: NaiveDateTime,
) -> Result<BackupPlan, PlanError> {
    let existing = inventory.names();
    let mut generated = HashSet::new();
    let mut plan = BackupPlan::default();

    for guest in inventory.guests() {
        if guest.lineage().is_some() {
            continue;
        }
        let Some(target) = targets.resolve(&guest.name)? else {
            continue;
        };

        let backup_name = naming::encode(&guest.name, now);
        if !generated.insert(backup_name.clone()) {
            return Err(PlanError::DuplicateBackupName(backup_name));
        }
        if existing.contains(backup_name.as_str()) {
            plan.skipped.push(SkippedCreate {
                source: guest.name.clone(),
                backup_name,
                reason: "a guest with this name already exists".to_string(),
            });
            continue;
        }

        plan.to_create.push(CreateRequest {
            source: guest.clone(),
            target: target.clone(),
            backup_name,
        });
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 10)
            .unwrap()
            .and_hms_opt(3, 15, 0)
            .unwrap()
    }

    fn targets(names: &[&str]) -> TargetMap {
        TargetMap::new(
            names
                .iter()
                .map(|n| BackupTarget {
                    base_name: n.to_string(),
                    datastore: "ds1".to_string(),
                    cluster: "cl1".to_string(),
                    folder: "Backups".to_string(),
                    retention_days: None,
                })
                .collect(),
        )
        .unwrap()
    }

    fn inventory(names: &[&str]) -> Inventory {
        Inventory::new(
            names
                .iter()
                .enumerate()
                .map(|(i, n)| Guest::new(*n, format!("vm-{i}")))
                .collect(),
        )
    }

    #[test]
    fn test_single_target() {
        let plan = plan_backups(&inventory(&["web1"]), &targets(&["web1"]), now()).unwrap();
        assert_eq!(plan.to_create.len(), 1);
        assert_eq!(plan.to_create[0].source.name, "web1");
        assert_eq!(plan.to_create[0].backup_name, "web1-backup-2020-01-10T03:15");
        assert_eq!(plan.to_create[0].target.datastore, "ds1");
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_only_configured_live_guests_are_sources() {
        let inv = inventory(&[
            "db1",
            "web1-backup-2020-01-01T00:00",
            "web1",
            "mail",
            "web2",
        ]);
        let plan = plan_backups(&inv, &targets(&["web1", "web2", "db1"]), now()).unwrap();
        let sources: Vec<_> = plan.to_create.iter().map(|r| r.source.name.as_str()).collect();
        assert_eq!(sources, ["db1", "web1", "web2"]);
    }

    #[test]
    fn test_backups_are_never_sources() {
        let inv = inventory(&["web1-backup-2020-01-01T00:00", "web1-backup-2019-12-31T23:59"]);
        let plan = plan_backups(&inv, &targets(&["web1"]), now()).unwrap();
        assert!(plan.to_create.is_empty());
    }

    #[test]
    fn test_target_without_guest_is_ignored() {
        let plan = plan_backups(&inventory(&["web2"]), &targets(&["web1"]), now()).unwrap();
        assert!(plan.to_create.is_empty());
    }

    #[test]
    fn test_existing_name_is_skipped() {
        let inv = inventory(&["web1", "web1-backup-2020-01-10T03:15"]);
        let plan = plan_backups(&inv, &targets(&["web1"]), now()).unwrap();
        assert!(plan.to_create.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].source, "web1");
    }

    #[test]
    fn test_duplicate_source_is_an_error() {
        let inv = inventory(&["web1", "web1"]);
        let err = plan_backups(&inv, &targets(&["web1"]), now()).unwrap_err();
        assert_eq!(
            err,
            PlanError::DuplicateBackupName("web1-backup-2020-01-10T03:15".to_string())
        );
    }
}
