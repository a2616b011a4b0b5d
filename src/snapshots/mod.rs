//! snapshots — point-in-time copies of registry files and everything built on them.
//!
//! Naming: `<original-filename>.backup.<YYYYMMDD_HHMMSS>` рядом с оригиналом.
//!
//! Состав:
//! - backup_file / backup_file_at: создать снапшот (никогда не перезаписывает существующий).
//! - scan_snapshots: перечислить снапшоты каталога (новые первыми).
//! - diff:      deleted / new / modified между снапшотом и live-реестром.
//! - restore:   выборочный merge удалённых сущностей или полная замена.
//! - retention: удаление снапшотов старше окна хранения.

pub mod diff;
pub mod restore;
pub mod retention;

use chrono::{DateTime, Local, NaiveDateTime};
use log::{debug, warn};
use std::fs::{self, File, FileTimes, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::consts::{BACKUP_MARKER, BACKUP_TS_FORMAT};
use crate::error::{CleanupError, Result};
use crate::metrics::record_snapshot_created;
use crate::registry::doc::{RegistryDoc, DEVICES_KEY, ENTITIES_KEY, ENTRIES_KEY};

pub use diff::{diff_registries, FieldChange, ModifiedEntity, RegistryDiff, COMPARE_FIELDS};
pub use restore::{
    full_restore, plan_full_restore, restore_entities, FullRestorePlan, RestoreOutcome,
};
pub use retention::{prune_snapshots, PruneReport};

/// Which registry a snapshot backs (по подстроке в имени файла).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    EntityRegistry,
    DeviceRegistry,
    ConfigEntries,
    Other,
}

impl SnapshotKind {
    pub fn from_file_name(name: &str) -> Self {
        if name.contains("entity_registry") {
            SnapshotKind::EntityRegistry
        } else if name.contains("device_registry") {
            SnapshotKind::DeviceRegistry
        } else if name.contains("config_entries") {
            SnapshotKind::ConfigEntries
        } else {
            SnapshotKind::Other
        }
    }

    /// `data.<key>` holding the items of this registry.
    pub fn list_key(&self) -> Option<&'static str> {
        match self {
            SnapshotKind::EntityRegistry => Some(ENTITIES_KEY),
            SnapshotKind::DeviceRegistry => Some(DEVICES_KEY),
            SnapshotKind::ConfigEntries => Some(ENTRIES_KEY),
            SnapshotKind::Other => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::EntityRegistry => "entity_registry",
            SnapshotKind::DeviceRegistry => "device_registry",
            SnapshotKind::ConfigEntries => "config_entries",
            SnapshotKind::Other => "other",
        }
    }
}

/// One snapshot found by `scan_snapshots`.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub path: PathBuf,
    /// Имя исходного файла (до `.backup.`).
    pub source_name: String,
    pub kind: SnapshotKind,
    pub timestamp: NaiveDateTime,
    /// false — timestamp взят из mtime (имя не распарсилось).
    pub timestamp_from_name: bool,
    pub size: u64,
    pub entity_count: usize,
}

impl SnapshotInfo {
    /// Path of the live registry this snapshot was taken from.
    pub fn live_path(&self) -> PathBuf {
        self.path.with_file_name(&self.source_name)
    }
}

pub fn snapshot_name(file_name: &str, ts: NaiveDateTime) -> String {
    format!("{}{}{}", file_name, BACKUP_MARKER, ts.format(BACKUP_TS_FORMAT))
}

pub fn is_snapshot_name(file_name: &str) -> bool {
    split_snapshot_name(file_name).is_some()
}

/// `core.entity_registry.backup.20240101_120000` → ("core.entity_registry", "20240101_120000").
pub fn split_snapshot_name(file_name: &str) -> Option<(&str, &str)> {
    let pos = file_name.rfind(BACKUP_MARKER)?;
    let source = &file_name[..pos];
    let ts = &file_name[pos + BACKUP_MARKER.len()..];
    if source.is_empty() || ts.is_empty() {
        return None;
    }
    Some((source, ts))
}

pub fn parse_snapshot_ts(ts: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(ts, BACKUP_TS_FORMAT).ok()
}

/// Snapshot `path` with the current local time.
pub fn backup_file(path: &Path) -> Result<PathBuf> {
    backup_file_at(path, Local::now().naive_local())
}

/// Snapshot `path` as `<path>.backup.<ts>`, preserving permissions and times.
///
/// NotFound if `path` is absent. If a snapshot with the same name already exists
/// (two backups within one second), the existing one is kept and its path returned.
pub fn backup_file_at(path: &Path, ts: NaiveDateTime) -> Result<PathBuf> {
    if !path.is_file() {
        return Err(CleanupError::NotFound(path.to_path_buf()));
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CleanupError::invalid(path, "file name is not UTF-8"))?;
    let dst = path.with_file_name(snapshot_name(file_name, ts));

    let mut out = match OpenOptions::new().write(true).create_new(true).open(&dst) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            warn!(
                "snapshot {} already exists (same second), keeping the earlier copy",
                dst.display()
            );
            return Ok(dst);
        }
        Err(e) => return Err(e.into()),
    };

    let res = (|| -> io::Result<()> {
        let mut src = File::open(path)?;
        io::copy(&mut src, &mut out)?;
        out.sync_all()?;
        let md = src.metadata()?;
        out.set_permissions(md.permissions())?;
        let mut times = FileTimes::new().set_modified(md.modified()?);
        if let Ok(atime) = md.accessed() {
            times = times.set_accessed(atime);
        }
        out.set_times(times)?;
        Ok(())
    })();

    if let Err(e) = res {
        // полуснапшот хуже, чем никакого
        drop(out);
        let _ = fs::remove_file(&dst);
        return Err(e.into());
    }

    record_snapshot_created();
    debug!("snapshot: {} -> {}", path.display(), dst.display());
    Ok(dst)
}

/// Enumerate snapshots in `dir`, newest first.
///
/// Unparseable snapshots are skipped with a warning; an unreadable dir yields an empty list.
pub fn scan_snapshots(dir: &Path) -> Vec<SnapshotInfo> {
    let rd = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            warn!("snapshots: cannot read {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for ent in rd.flatten() {
        let path = ent.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((source, ts)) = split_snapshot_name(name) else {
            continue;
        };
        let md = match ent.metadata() {
            Ok(md) if md.is_file() => md,
            _ => continue,
        };

        let (timestamp, timestamp_from_name) = match parse_snapshot_ts(ts) {
            Some(t) => (t, true),
            None => (mtime_as_local(md.modified().ok()), false),
        };

        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                warn!("snapshots: skip {}: {}", path.display(), e);
                continue;
            }
        };
        let doc = match RegistryDoc::from_slice(&path, &bytes) {
            Ok(d) => d,
            Err(e) => {
                warn!("snapshots: skip {}", e);
                continue;
            }
        };

        let kind = SnapshotKind::from_file_name(source);
        let entity_count = doc.list_len(kind.list_key().unwrap_or(ENTITIES_KEY));

        out.push(SnapshotInfo {
            source_name: source.to_string(),
            path,
            kind,
            timestamp,
            timestamp_from_name,
            size: md.len(),
            entity_count,
        });
    }

    out.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.path.cmp(&b.path))
    });
    out
}

fn mtime_as_local(t: Option<SystemTime>) -> NaiveDateTime {
    let t = t.unwrap_or(SystemTime::UNIX_EPOCH);
    DateTime::<Local>::from(t).naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_roundtrip_and_split() {
        let ts = parse_snapshot_ts("20240131_235959").unwrap();
        let n = snapshot_name("core.entity_registry", ts);
        assert_eq!(n, "core.entity_registry.backup.20240131_235959");
        assert_eq!(
            split_snapshot_name(&n),
            Some(("core.entity_registry", "20240131_235959"))
        );
        assert!(!is_snapshot_name("core.entity_registry"));
        assert!(!is_snapshot_name("core.entity_registry.tmp"));
    }

    #[test]
    fn kind_by_substring() {
        assert_eq!(
            SnapshotKind::from_file_name("core.device_registry"),
            SnapshotKind::DeviceRegistry
        );
        assert_eq!(
            SnapshotKind::from_file_name("core.config_entries"),
            SnapshotKind::ConfigEntries
        );
        assert_eq!(SnapshotKind::from_file_name("automations"), SnapshotKind::Other);
    }

    #[test]
    fn bad_timestamp_is_not_parsed() {
        assert!(parse_snapshot_ts("2024-01-01").is_none());
        assert!(parse_snapshot_ts("20241301_000000").is_none());
    }
}
