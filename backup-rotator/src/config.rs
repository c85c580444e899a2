//! Configuration management for the rotator.
//!
//! Loads configuration from a TOML file with environment variable overrides.

use crate::Result;
use rotation_core::{BackupTarget, ConfigError, RunSettings, TargetMap};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_SERVER: &str = "ROTATOR_SERVER";
pub const ENV_USERNAME: &str = "ROTATOR_USERNAME";
pub const ENV_PASSWORD: &str = "ROTATOR_PASSWORD";
pub const ENV_RETENTION_DAYS: &str = "ROTATOR_RETENTION_DAYS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatorConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Control-plane API base URL
    #[serde(default)]
    pub server: String,

    #[serde(default)]
    pub username: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    /// Seconds between task status polls
    #[serde(default = "default_poll_interval")]
    pub task_poll_interval_secs: u64,

    /// Give up waiting on a single task after this many seconds
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,

    /// Accept invalid TLS certificates
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Run-wide retention period in days
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Folder for clones of targets that name none
    #[serde(default = "default_target_folder")]
    pub target_folder: String,

    /// Thin-provision clones
    #[serde(default = "default_sparse")]
    pub sparse: bool,

    /// Maximum provider operations in flight
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Cron expression (with seconds) for daemon mode
    #[serde(default)]
    pub schedule: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub base_name: String,
    pub datastore: String,
    pub cluster: String,

    #[serde(default)]
    pub retention_days: Option<u32>,

    #[serde(default)]
    pub folder: Option<String>,
}

// Default values
fn default_poll_interval() -> u64 {
    2
}

fn default_task_timeout() -> u64 {
    3600
}

fn default_retention_days() -> u32 {
    7
}

fn default_target_folder() -> String {
    "Backups".to_string()
}

fn default_sparse() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            username: String::new(),
            password: String::new(),
            task_poll_interval_secs: default_poll_interval(),
            task_timeout_secs: default_task_timeout(),
            insecure: false,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            target_folder: default_target_folder(),
            sparse: default_sparse(),
            max_concurrent: default_max_concurrent(),
            schedule: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RotatorConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `ROTATOR_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> std::result::Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> std::result::Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(server) = lookup(ENV_SERVER) {
            self.provider.server = server;
        }
        if let Some(username) = lookup(ENV_USERNAME) {
            self.provider.username = username;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.provider.password = password;
        }
        if let Some(days) = lookup(ENV_RETENTION_DAYS) {
            self.backup.retention_days = days.trim().parse().map_err(|_| ConfigError::InvalidSetting {
                key: ENV_RETENTION_DAYS,
                reason: format!("'{days}' is not a whole number of days"),
            })?;
        }
        Ok(())
    }

    /// Check required settings and build the target map.
    pub fn validate(&self) -> std::result::Result<TargetMap, ConfigError> {
        let provider = &self.provider;
        if provider.server.trim().is_empty() {
            return Err(ConfigError::MissingSetting("provider.server"));
        }
        if !provider.server.starts_with("http://") && !provider.server.starts_with("https://") {
            return Err(ConfigError::InvalidSetting {
                key: "provider.server",
                reason: format!("'{}' is not an http(s) URL", provider.server),
            });
        }
        if provider.username.is_empty() {
            return Err(ConfigError::MissingSetting("provider.username"));
        }
        if provider.password.is_empty() {
            return Err(ConfigError::MissingSetting("provider.password"));
        }
        if provider.task_poll_interval_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "provider.task_poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if provider.task_timeout_secs < provider.task_poll_interval_secs {
            return Err(ConfigError::InvalidSetting {
                key: "provider.task_timeout_secs",
                reason: "must not be shorter than the poll interval".to_string(),
            });
        }
        if self.backup.max_concurrent == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "backup.max_concurrent",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.targets.is_empty() {
            return Err(ConfigError::MissingSetting("targets"));
        }

        let targets = self
            .targets
            .iter()
            .map(|t| self.resolve_target(t))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        TargetMap::new(targets)
    }

    fn resolve_target(&self, target: &TargetConfig) -> std::result::Result<BackupTarget, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidTarget {
            name: target.base_name.clone(),
            reason: reason.to_string(),
        };
        if target.datastore.trim().is_empty() {
            return Err(invalid("datastore is empty"));
        }
        if target.cluster.trim().is_empty() {
            return Err(invalid("cluster is empty"));
        }
        let folder = target
            .folder
            .clone()
            .unwrap_or_else(|| self.backup.target_folder.clone());
        if folder.trim().is_empty() {
            return Err(invalid("folder is empty"));
        }

        Ok(BackupTarget {
            base_name: target.base_name.clone(),
            datastore: target.datastore.clone(),
            cluster: target.cluster.clone(),
            folder,
            retention_days: target.retention_days,
        })
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            default_retention_days: self.backup.retention_days,
            sparse: self.backup.sparse,
            max_concurrent: self.backup.max_concurrent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RotatorError;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
[provider]
server = "https://vcenter.example/api"
username = "backup"
password = "secret"

[backup]
retention_days = 6
max_concurrent = 2

[[targets]]
base_name = "web1"
datastore = "ds1"
cluster = "cl1"

[[targets]]
base_name = "db1"
datastore = "ds2"
cluster = "cl1"
retention_days = 30
folder = "DbBackups"
"#;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = RotatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.provider.server, "https://vcenter.example/api");
        assert_eq!(config.backup.retention_days, 6);
        assert_eq!(config.targets.len(), 2);
    }

    #[test]
    fn test_defaults() {
        let config = RotatorConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.provider.task_poll_interval_secs, 2);
        assert_eq!(config.provider.task_timeout_secs, 3600);
        assert!(!config.provider.insecure);
        assert_eq!(config.backup.target_folder, "Backups");
        assert!(config.backup.sparse);
        assert!(config.backup.schedule.is_none());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_missing_file() {
        let err = RotatorConfig::from_file(Path::new("/nonexistent/rotator.toml")).unwrap_err();
        assert!(matches!(err, RotatorError::Io(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = RotatorConfig::from_toml_str("[backup\nretention_days = 6").unwrap_err();
        assert!(matches!(err, RotatorError::Parse(_)));
    }

    #[test]
    fn test_validate_builds_targets() {
        let config = RotatorConfig::from_toml_str(SAMPLE).unwrap();
        let map = config.validate().unwrap();

        let web = map.resolve("web1").unwrap().unwrap();
        assert_eq!(web.folder, "Backups");
        assert_eq!(web.retention_days, None);

        let db = map.resolve("db1").unwrap().unwrap();
        assert_eq!(db.folder, "DbBackups");
        assert_eq!(db.retention_days, Some(30));
    }

    #[test]
    fn test_run_settings() {
        let settings = RotatorConfig::from_toml_str(SAMPLE).unwrap().run_settings();
        assert_eq!(settings.default_retention_days, 6);
        assert_eq!(settings.max_concurrent, 2);
        assert!(settings.sparse);
    }

    #[test]
    fn test_missing_server() {
        let mut config = RotatorConfig::from_toml_str(SAMPLE).unwrap();
        config.provider.server.clear();
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::MissingSetting("provider.server")
        );
    }

    #[test]
    fn test_no_targets() {
        let config = RotatorConfig::from_toml_str("[provider]\nserver = \"http://x\"\nusername = \"u\"\npassword = \"p\"\n").unwrap();
        assert_eq!(config.validate().unwrap_err(), ConfigError::MissingSetting("targets"));
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let mut config = RotatorConfig::from_toml_str(SAMPLE).unwrap();
        let dup = config.targets[0].clone();
        config.targets.push(dup);
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::DuplicateTarget(name) if name == "web1"
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = RotatorConfig::from_toml_str(SAMPLE).unwrap();
        config.backup.max_concurrent = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidSetting { key: "backup.max_concurrent", .. }
        ));
    }

    #[test]
    fn test_empty_datastore_rejected() {
        let mut config = RotatorConfig::from_toml_str(SAMPLE).unwrap();
        config.targets[1].datastore.clear();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidTarget { name, .. } if name == "db1"
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = RotatorConfig::from_toml_str(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_SERVER, "https://other.example/api"),
            (ENV_PASSWORD, "from-env"),
            (ENV_RETENTION_DAYS, "14"),
        ]
        .into_iter()
        .collect();

        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.provider.server, "https://other.example/api");
        assert_eq!(config.provider.username, "backup");
        assert_eq!(config.provider.password, "from-env");
        assert_eq!(config.backup.retention_days, 14);
    }

    #[test]
    fn test_bad_retention_override() {
        let mut config = RotatorConfig::from_toml_str(SAMPLE).unwrap();
        let err = config
            .apply_overrides(|key| (key == ENV_RETENTION_DAYS).then(|| "a week".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidSetting { key: ENV_RETENTION_DAYS, .. }
        ));
    }

    #[test]
    fn test_password_not_serialized() {
        let config = RotatorConfig::from_toml_str(SAMPLE).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
