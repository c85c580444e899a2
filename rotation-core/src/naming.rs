//! Backup naming convention.
//!
//! A backup guest is named `{base}-backup-{YYYY-MM-DDThh:mm}`, where `base` is
//! the name of the guest it was cloned from and the suffix is the local
//! wall-clock minute of the run that created it. The pattern is anchored at
//! the end of the name, so base names may contain hyphens or the word
//! `backup` themselves.

use chrono::{NaiveDateTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Separator between the base name and the timestamp.
pub const BACKUP_INFIX: &str = "-backup-";

/// Minute-precision timestamp format used in backup names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";

static BACKUP_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(?P<base>.+)-backup-(?P<ts>[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2})$")
        .expect("backup name pattern is valid")
});

/// The source guest and creation minute recovered from a backup's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupLineage {
    pub base_name: String,
    pub created_at: NaiveDateTime,
}

/// Build the backup name for `base_name` at `timestamp`.
///
/// Seconds and sub-seconds of `timestamp` are dropped.
pub fn encode(base_name: &str, timestamp: NaiveDateTime) -> String {
    format!(
        "{}{}{}",
        base_name,
        BACKUP_INFIX,
        timestamp.format(TIMESTAMP_FORMAT)
    )
}

/// Parse a guest name as a backup name.
///
/// Returns `None` for live guests, including names whose suffix has the right
/// shape but is not a real calendar date and time.
pub fn decode(name: &str) -> Option<BackupLineage> {
    let caps = BACKUP_NAME.captures(name)?;
    let created_at = NaiveDateTime::parse_from_str(&caps["ts"], TIMESTAMP_FORMAT).ok()?;
    Some(BackupLineage {
        base_name: caps["base"].to_string(),
        created_at,
    })
}

pub fn is_backup_name(name: &str) -> bool {
    decode(name).is_some()
}

/// Drop seconds and sub-seconds so `now` compares exactly with decoded names.
pub fn truncate_to_minute(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(timestamp)
}
