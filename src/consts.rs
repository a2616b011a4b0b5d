//! Общие константы: имена файлов Home Assistant, формат снапшотов, пороги.

// -------- Config dir discovery --------
/// Кандидаты по порядку: HAOS add-on, Docker/Core container, venv-установка ($HOME).
pub const CONFIG_DIR_CANDIDATES: &[&str] = &["/homeassistant", "/config"];
pub const HOME_CONFIG_DIR: &str = ".homeassistant";

// -------- Layout inside the config dir --------
pub const STORAGE_DIR: &str = ".storage";
pub const ENTITY_REGISTRY_FILE: &str = "core.entity_registry";
pub const DEVICE_REGISTRY_FILE: &str = "core.device_registry";
pub const CONFIG_ENTRIES_FILE: &str = "core.config_entries";
pub const RECORDER_DB_FILE: &str = "home-assistant_v2.db";
pub const CONFIGURATION_YAML: &str = "configuration.yaml";

// -------- Snapshots --------
/// <original-filename>.backup.<YYYYMMDD_HHMMSS>
pub const BACKUP_MARKER: &str = ".backup.";
pub const BACKUP_TS_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const DEFAULT_BACKUP_RETENTION_DAYS: u64 = 7;

/// Полное восстановление: предупреждаем, если число сущностей меняется больше чем на 50%.
pub const FULL_RESTORE_WARN_RATIO: f64 = 0.5;

// -------- Recorder --------
pub const DEFAULT_PURGE_KEEP_DAYS: u64 = 14;

// -------- Host process control --------
pub const DEFAULT_SETTLE_SECS: u64 = 10;
pub const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 120;
pub const HA_SYSTEMD_UNIT: &str = "home-assistant@homeassistant";
pub const HA_CONTAINER_NAME: &str = "homeassistant";

// -------- Atomic writes --------
pub const TMP_SUFFIX: &str = ".tmp";
