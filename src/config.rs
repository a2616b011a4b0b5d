//! Centralized configuration for a cleanup run.
//!
//! Goals:
//! - Discover the Home Assistant config dir once and derive every path from it.
//! - Keep tunables in one immutable struct that is passed to every component
//!   (tests point it at fixture directories instead of mutating globals).
//!
//! Env overrides (read by `CleanupConfig::from_env`):
//! - HA_CONFIG_DIR            — explicit config dir (skips discovery)
//! - HA_BACKUP_RETENTION_DAYS — snapshot retention window (default 7)
//! - HA_SETTLE_SECS           — wait after stopping the host (default 10)
//! - HA_PROCESS_TIMEOUT_SECS  — bound for each stop/start call (default 120)

use anyhow::{anyhow, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::consts::{
    CONFIGURATION_YAML, CONFIG_DIR_CANDIDATES, CONFIG_ENTRIES_FILE, DEFAULT_BACKUP_RETENTION_DAYS,
    DEFAULT_PROCESS_TIMEOUT_SECS, DEFAULT_SETTLE_SECS, DEVICE_REGISTRY_FILE,
    ENTITY_REGISTRY_FILE, HOME_CONFIG_DIR, RECORDER_DB_FILE, STORAGE_DIR,
};

#[derive(Clone, Debug)]
pub struct CleanupConfig {
    /// Корень конфигурации Home Assistant.
    pub config_dir: PathBuf,

    /// Возраст снапшотов (в днях), после которого их удаляет prune.
    pub backup_retention_days: u64,

    /// Пауза после остановки HA, прежде чем трогать файлы.
    pub settle_delay: Duration,

    /// Лимит на каждый вызов stop/start.
    pub process_timeout: Duration,
}

impl CleanupConfig {
    /// Config rooted at an explicit directory, all tunables at defaults.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            backup_retention_days: DEFAULT_BACKUP_RETENTION_DAYS,
            settle_delay: Duration::from_secs(DEFAULT_SETTLE_SECS),
            process_timeout: Duration::from_secs(DEFAULT_PROCESS_TIMEOUT_SECS),
        }
    }

    /// Discover the config dir (explicit > HA_CONFIG_DIR > candidates) and apply env tunables.
    pub fn from_env(explicit: Option<PathBuf>) -> Result<Self> {
        let env_dir = std::env::var("HA_CONFIG_DIR")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let dir = match explicit.or(env_dir) {
            Some(p) => {
                if !p.is_dir() {
                    return Err(anyhow!("config dir {} does not exist", p.display()));
                }
                p
            }
            None => discover_config_dir()
                .ok_or_else(|| anyhow!("could not find Home Assistant config directory"))?,
        };

        let mut cfg = Self::new(dir);

        if let Ok(v) = std::env::var("HA_BACKUP_RETENTION_DAYS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.backup_retention_days = n;
            }
        }
        if let Ok(v) = std::env::var("HA_SETTLE_SECS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.settle_delay = Duration::from_secs(n);
            }
        }
        if let Ok(v) = std::env::var("HA_PROCESS_TIMEOUT_SECS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.process_timeout = Duration::from_secs(n);
            }
        }

        Ok(cfg)
    }

    pub fn with_backup_retention_days(mut self, days: u64) -> Self {
        self.backup_retention_days = days;
        self
    }

    pub fn with_settle_delay(mut self, d: Duration) -> Self {
        self.settle_delay = d;
        self
    }

    pub fn with_process_timeout(mut self, d: Duration) -> Self {
        self.process_timeout = d;
        self
    }

    // ----- derived paths -----

    pub fn storage_dir(&self) -> PathBuf {
        self.config_dir.join(STORAGE_DIR)
    }

    pub fn entity_registry(&self) -> PathBuf {
        self.storage_dir().join(ENTITY_REGISTRY_FILE)
    }

    pub fn device_registry(&self) -> PathBuf {
        self.storage_dir().join(DEVICE_REGISTRY_FILE)
    }

    pub fn config_entries(&self) -> PathBuf {
        self.storage_dir().join(CONFIG_ENTRIES_FILE)
    }

    pub fn recorder_db(&self) -> PathBuf {
        self.config_dir.join(RECORDER_DB_FILE)
    }

    pub fn configuration_yaml(&self) -> PathBuf {
        self.config_dir.join(CONFIGURATION_YAML)
    }
}

/// First existing directory among the fixed candidates, then $HOME/.homeassistant.
pub fn discover_config_dir() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = CONFIG_DIR_CANDIDATES.iter().map(PathBuf::from).collect();
    if let Some(home) = std::env::var_os("HOME") {
        candidates.push(Path::new(&home).join(HOME_CONFIG_DIR));
    }
    candidates.into_iter().find(|p| p.is_dir())
}

impl fmt::Display for CleanupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CleanupConfig {{ \
             config_dir: {}, \
             backup_retention_days: {}, \
             settle_delay: {}s, \
             process_timeout: {}s \
             }}",
            self.config_dir.display(),
            self.backup_retention_days,
            self.settle_delay.as_secs(),
            self.process_timeout.as_secs(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_follow_storage_layout() {
        let cfg = CleanupConfig::new("/tmp/ha");
        assert_eq!(
            cfg.entity_registry(),
            PathBuf::from("/tmp/ha/.storage/core.entity_registry")
        );
        assert_eq!(
            cfg.config_entries(),
            PathBuf::from("/tmp/ha/.storage/core.config_entries")
        );
        assert_eq!(cfg.recorder_db(), PathBuf::from("/tmp/ha/home-assistant_v2.db"));
    }

    #[test]
    fn setters_override_defaults() {
        let cfg = CleanupConfig::new("/tmp/ha")
            .with_backup_retention_days(3)
            .with_settle_delay(Duration::ZERO);
        assert_eq!(cfg.backup_retention_days, 3);
        assert_eq!(cfg.settle_delay, Duration::ZERO);
        assert_eq!(cfg.process_timeout.as_secs(), DEFAULT_PROCESS_TIMEOUT_SECS);

        let cfg = cfg.with_process_timeout(Duration::from_secs(5));
        assert_eq!(cfg.process_timeout, Duration::from_secs(5));
    }
}
