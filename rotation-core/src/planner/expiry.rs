use crate::error::PlanError;
use crate::inventory::{Guest, Inventory, TargetMap};
use crate::naming::BackupLineage;
use crate::retention::{self, RetentionPolicy};
use serde::{Deserialize, Serialize};

/// Retire `guest`, a backup older than its target's retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub guest: Guest,
    pub lineage: BackupLineage,
    pub age_days: i64,
    pub retention_days: u32,
}

/// Select expired backups of configured targets from the pre-run inventory.
///
/// Backups whose base name is not a target are left alone: they belong to
/// someone else.
pub fn plan_expiry(
    inventory: &Inventory,
    targets: &TargetMap,
    policy: &RetentionPolicy,
) -> Result<Vec<DeleteRequest>, PlanError> {
    let mut to_delete = Vec::new();

    for guest in inventory.guests() {
        let Some(lineage) = guest.lineage() else {
            continue;
        };
        let Some(target) = targets.resolve(&lineage.base_name)? else {
            continue;
        };
        // Stamped after `now`: clock skew between runs, never retire it.
        if lineage.created_at > policy.now {
            continue;
        }

        let retention_days = policy.effective_days(target);
        let age = policy.age_of(&lineage);
        if retention::is_expired(age, retention_days) {
            to_delete.push(DeleteRequest {
                guest: guest.clone(),
                lineage,
                age_days: age.num_days(),
                retention_days,
            });
        }
    }

    Ok(to_delete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::BackupTarget;
    use chrono::{NaiveDate, NaiveDateTime};

    fn jan(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn target(name: &str, retention_days: Option<u32>) -> BackupTarget {
        BackupTarget {
            base_name: name.to_string(),
            datastore: "ds1".to_string(),
            cluster: "cl1".to_string(),
            folder: "Backups".to_string(),
            retention_days,
        }
    }

    fn inventory(names: &[&str]) -> Inventory {
        Inventory::new(names.iter().map(|n| Guest::new(*n, format!("id-{n}"))).collect())
    }

    fn deleted(plan: &[DeleteRequest]) -> Vec<&str> {
        plan.iter().map(|r| r.guest.name.as_str()).collect()
    }

    #[test]
    fn test_expired_backup_is_deleted() {
        let inv = inventory(&["web1", "web1-backup-2020-01-01T00:00"]);
        let map = TargetMap::new(vec![target("web1", None)]).unwrap();
        let plan = plan_expiry(&inv, &map, &RetentionPolicy::new(6, jan(10))).unwrap();
        assert_eq!(deleted(&plan), ["web1-backup-2020-01-01T00:00"]);
        assert_eq!(plan[0].age_days, 9);
        assert_eq!(plan[0].retention_days, 6);
    }

    #[test]
    fn test_fresh_backup_is_kept() {
        let inv = inventory(&["web1", "web1-backup-2020-01-01T00:00"]);
        let map = TargetMap::new(vec![target("web1", None)]).unwrap();
        let plan = plan_expiry(&inv, &map, &RetentionPolicy::new(30, jan(10))).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_unaffiliated_backup_is_ignored() {
        let inv = inventory(&["orphan-backup-2019-01-01T00:00", "web1"]);
        let map = TargetMap::new(vec![target("web1", None)]).unwrap();
        let plan = plan_expiry(&inv, &map, &RetentionPolicy::new(6, jan(10))).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_live_guests_are_never_deleted() {
        let inv = inventory(&["web1", "web1-backup"]);
        let map = TargetMap::new(vec![target("web1", None)]).unwrap();
        let plan = plan_expiry(&inv, &map, &RetentionPolicy::new(0, jan(10))).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_target_override_wins() {
        let inv = inventory(&[
            "web1-backup-2020-01-01T00:00",
            "db-backup-2020-01-01T00:00",
        ]);
        let map = TargetMap::new(vec![target("web1", None), target("db", Some(30))]).unwrap();
        let plan = plan_expiry(&inv, &map, &RetentionPolicy::new(6, jan(10))).unwrap();
        assert_eq!(deleted(&plan), ["web1-backup-2020-01-01T00:00"]);
    }

    #[test]
    fn test_exactly_retention_days_is_deleted() {
        let inv = inventory(&["web1-backup-2020-01-04T00:00", "web1-backup-2020-01-04T00:01"]);
        let map = TargetMap::new(vec![target("web1", None)]).unwrap();
        let plan = plan_expiry(&inv, &map, &RetentionPolicy::new(6, jan(10))).unwrap();
        assert_eq!(deleted(&plan), ["web1-backup-2020-01-04T00:00"]);
    }

    #[test]
    fn test_prefix_names_do_not_match() {
        // "web" is a prefix of "web1" but resolution is exact
        let inv = inventory(&["web1-backup-2020-01-01T00:00"]);
        let map = TargetMap::new(vec![target("web", None)]).unwrap();
        let plan = plan_expiry(&inv, &map, &RetentionPolicy::new(1, jan(10))).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_future_backup_is_kept() {
        let inv = inventory(&["web1-backup-2020-02-01T00:00", "web1-backup-2020-01-10T00:00"]);
        let map = TargetMap::new(vec![target("web1", None)]).unwrap();
        let plan = plan_expiry(&inv, &map, &RetentionPolicy::new(0, jan(10))).unwrap();
        // Zero-day retention expires the backup stamped `now`, not the future one
        assert_eq!(deleted(&plan), ["web1-backup-2020-01-10T00:00"]);
        assert_eq!(plan[0].age_days, 0);
    }
}
