//! snapshots/retention — удаление снапшотов старше окна хранения.
//!
//! Возраст снапшота = max(mtime, время из имени). Снапшот копирует mtime
//! исходника, поэтому свежая копия давно не менявшегося реестра по одному mtime
//! выглядела бы старой и удалялась бы сразу после создания.
//!
//! Трогаются только файлы с именем `*.backup.*`; live-реестры не удаляются никогда.

use chrono::{Local, TimeZone};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::{parse_snapshot_ts, split_snapshot_name};
use crate::metrics::record_snapshots_pruned;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruneReport {
    /// Removed (or, in dry-run, would be removed).
    pub removed: Vec<PathBuf>,
    pub failed: usize,
    pub kept: usize,
}

impl PruneReport {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

pub fn prune_snapshots(dir: &Path, retention: Duration, now: SystemTime, dry_run: bool) -> PruneReport {
    let mut report = PruneReport::default();
    let cutoff = now.checked_sub(retention).unwrap_or(SystemTime::UNIX_EPOCH);

    let rd = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            warn!("prune: cannot read {}: {}", dir.display(), e);
            return report;
        }
    };

    let mut candidates: Vec<PathBuf> = Vec::new();
    for ent in rd.flatten() {
        let path = ent.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((_, ts)) = split_snapshot_name(name) else {
            continue;
        };
        let md = match ent.metadata() {
            Ok(md) if md.is_file() => md,
            _ => continue,
        };
        let Ok(mtime) = md.modified() else {
            report.kept += 1;
            continue;
        };
        let age_ref = match name_time(ts) {
            Some(t) if t > mtime => t,
            _ => mtime,
        };
        if age_ref < cutoff {
            candidates.push(path);
        } else {
            report.kept += 1;
        }
    }
    candidates.sort();

    for path in candidates {
        if dry_run {
            report.removed.push(path);
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => report.removed.push(path),
            Err(e) => {
                warn!("prune: failed to remove {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    if !dry_run && !report.removed.is_empty() {
        record_snapshots_pruned(report.removed.len() as u64);
        info!("prune: removed {} old snapshot(s) from {}", report.removed.len(), dir.display());
    }
    report
}

fn name_time(ts: &str) -> Option<SystemTime> {
    let naive = parse_snapshot_ts(ts)?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(SystemTime::from(local))
}
