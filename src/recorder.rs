//! recorder — bounded-retention purge of the Home Assistant recorder database.
//!
//! Срок хранения (дни):
//!   configuration.yaml, секция `recorder:` → `purge_keep_days`
//!   → запись `recorder` в core.config_entries, `options.purge_keep_days`
//!   → DEFAULT_PURGE_KEEP_DAYS.
//!
//! Чистка: states по last_updated_ts, events по time_fired_ts (оба — unix secs, REAL),
//! затем осиротевшие state_attributes / event_data, затем VACUUM.
//! Нет файла БД — пропускаем.

use log::{info, warn};
use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::CleanupConfig;
use crate::consts::DEFAULT_PURGE_KEEP_DAYS;
use crate::error::Result;
use crate::registry::doc::ENTRIES_KEY;
use crate::registry::{DocCache, RegistryStore};

const PURGE_KEY: &str = "purge_keep_days";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionSource {
    ConfigurationYaml,
    ConfigEntry,
    Default,
}

/// Resolve the recorder retention window in days.
pub fn purge_keep_days<C: DocCache>(
    cfg: &CleanupConfig,
    store: &mut RegistryStore<C>,
) -> (u64, RetentionSource) {
    if let Ok(text) = fs::read_to_string(cfg.configuration_yaml()) {
        if let Some(days) = purge_days_from_yaml(&text) {
            info!("Using recorder purge_keep_days from configuration.yaml: {}", days);
            return (days, RetentionSource::ConfigurationYaml);
        }
    }

    if let Ok(doc) = store.load(&cfg.config_entries()) {
        let from_entry = doc.list(ENTRIES_KEY).and_then(|entries| {
            entries
                .iter()
                .filter(|e| e.get("domain").and_then(|d| d.as_str()) == Some("recorder"))
                .find_map(|e| e.get("options").and_then(|o| o.get(PURGE_KEY)))
                .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        });
        if let Some(days) = from_entry {
            info!("Using recorder purge_keep_days from config entries: {}", days);
            return (days, RetentionSource::ConfigEntry);
        }
    }

    info!("Using default purge_keep_days: {}", DEFAULT_PURGE_KEEP_DAYS);
    (DEFAULT_PURGE_KEEP_DAYS, RetentionSource::Default)
}

/// Line scan of configuration.yaml: `purge_keep_days` inside the top-level `recorder:` block.
pub fn purge_days_from_yaml(text: &str) -> Option<u64> {
    let mut in_recorder = false;
    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        let top_level = !line.starts_with(' ') && !line.starts_with('\t') && !stripped.starts_with('-');
        if top_level {
            in_recorder = stripped.starts_with("recorder:");
            continue;
        }
        if in_recorder {
            if let Some(rest) = stripped.strip_prefix(PURGE_KEY) {
                let Some(value) = rest.trim_start().strip_prefix(':') else {
                    continue;
                };
                let value = value.split('#').next().unwrap_or("").trim();
                return value.parse().ok();
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PurgeReport {
    pub states: u64,
    pub events: u64,
    pub days: u64,
    /// Rows actually deleted (false for dry-run or nothing to purge).
    pub purged: bool,
}

impl PurgeReport {
    pub fn is_empty(&self) -> bool {
        self.states == 0 && self.events == 0
    }
}

/// Unix seconds `days` before `now`.
pub fn cutoff_ts(now: SystemTime, days: u64) -> f64 {
    let cutoff = now
        .checked_sub(Duration::from_secs(days.saturating_mul(86_400)))
        .unwrap_or(UNIX_EPOCH);
    cutoff
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Purge rows older than `days`. Ok(None) when the database file does not exist.
pub fn purge_database(
    db_path: &Path,
    days: u64,
    now: SystemTime,
    dry_run: bool,
) -> Result<Option<PurgeReport>> {
    if !db_path.exists() {
        info!("No database found at {}, skipping", db_path.display());
        return Ok(None);
    }

    let cutoff = cutoff_ts(now, days);
    let mut conn = Connection::open(db_path)?;

    let states: i64 = conn.query_row(
        "SELECT COUNT(*) FROM states WHERE last_updated_ts < ?1",
        params![cutoff],
        |r| r.get(0),
    )?;
    let events: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE time_fired_ts < ?1",
        params![cutoff],
        |r| r.get(0),
    )?;

    let mut report = PurgeReport {
        states: states.max(0) as u64,
        events: events.max(0) as u64,
        days,
        purged: false,
    };

    if report.is_empty() {
        info!("recorder: nothing older than {} days", days);
        return Ok(Some(report));
    }

    info!(
        "{} {} states, {} events older than {} days",
        if dry_run { "Would purge" } else { "Purging" },
        report.states,
        report.events,
        days
    );
    if dry_run {
        return Ok(Some(report));
    }

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM states WHERE last_updated_ts < ?1", params![cutoff])?;
    tx.execute("DELETE FROM events WHERE time_fired_ts < ?1", params![cutoff])?;
    tx.execute(
        "DELETE FROM state_attributes WHERE NOT EXISTS \
         (SELECT 1 FROM states WHERE states.attributes_id = state_attributes.attributes_id)",
        [],
    )?;
    tx.execute(
        "DELETE FROM event_data WHERE NOT EXISTS \
         (SELECT 1 FROM events WHERE events.data_id = event_data.data_id)",
        [],
    )?;
    tx.commit()?;

    // VACUUM вне транзакции
    if let Err(e) = conn.execute_batch("VACUUM") {
        warn!("recorder: VACUUM failed: {}", e);
    }
    report.purged = true;
    info!("Database purged and vacuumed");
    Ok(Some(report))
}

/// File size in MB, 0.0 when absent.
pub fn db_size_mb(db_path: &Path) -> f64 {
    fs::metadata(db_path)
        .map(|m| m.len() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_recorder_section() {
        let text = "\
homeassistant:
  name: Home
recorder:
  db_url: sqlite:///x
  purge_keep_days: 5  # short
http:
  purge_keep_days: 99
";
        assert_eq!(purge_days_from_yaml(text), Some(5));
    }

    #[test]
    fn yaml_key_outside_recorder_ignored() {
        let text = "http:\n  purge_keep_days: 3\nrecorder:\n  commit_interval: 1\n";
        assert_eq!(purge_days_from_yaml(text), None);
    }

    #[test]
    fn yaml_unparseable_value_is_none() {
        let text = "recorder:\n  purge_keep_days: !secret days\n";
        assert_eq!(purge_days_from_yaml(text), None);
    }

    #[test]
    fn cutoff_is_days_before_now() {
        let now = UNIX_EPOCH + Duration::from_secs(10 * 86_400);
        assert_eq!(cutoff_ts(now, 3), (7 * 86_400) as f64);
        assert_eq!(cutoff_ts(now, 100), 0.0);
    }

    #[test]
    fn missing_db_is_skipped() {
        let p = std::env::temp_dir().join("hacleanup-no-such-recorder.db");
        let _ = fs::remove_file(&p);
        assert!(purge_database(&p, 14, SystemTime::now(), false).unwrap().is_none());
        assert_eq!(db_size_mb(&p), 0.0);
    }
}
