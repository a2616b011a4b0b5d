//! snapshots/restore — вернуть сущности из снапшота в live-реестр.
//!
//! Два сценария:
//! - restore_entities: выборочный merge сущностей из бакета `deleted`. Сущность,
//!   чей entity_id уже есть в live, пропускается (без перезаписи).
//! - plan_full_restore + full_restore: проверить форму снапшота, посчитать
//!   дельту числа сущностей, затем заменить live байтами снапшота целиком.
//!
//! Оба пути делают снапшот live-файла перед записью. Остановку HA вокруг
//! вызова обеспечивает вызывающая сторона (host::with_host_stopped).

use log::{info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::diff::entity_id_of;
use super::SnapshotKind;
use crate::consts::FULL_RESTORE_WARN_RATIO;
use crate::error::{CleanupError, Result};
use crate::metrics::record_entities_restored;
use crate::registry::doc::ENTITIES_KEY;
use crate::registry::{DocCache, RegistryDoc, RegistryStore};
use crate::selection::SelectionSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreOutcome {
    pub selected: usize,
    /// Entities actually appended (or that would be, in dry-run).
    pub appended: Vec<String>,
    /// Skipped because the id already exists in live.
    pub skipped: Vec<String>,
    /// Snapshot of live taken before the merge (None in dry-run / nothing to do).
    pub backup: Option<PathBuf>,
}

/// Merge the selected `candidates` (1-based indices) back into the live entity registry.
pub fn restore_entities<C: DocCache>(
    store: &mut RegistryStore<C>,
    live_path: &Path,
    candidates: &[Value],
    selection: &SelectionSet,
    dry_run: bool,
) -> Result<RestoreOutcome> {
    let picked = selection.pick(candidates);
    let mut outcome = RestoreOutcome {
        selected: picked.len(),
        ..Default::default()
    };
    if picked.is_empty() {
        return Ok(outcome);
    }

    let mut live = store.load(live_path)?;
    if !live.has_list(ENTITIES_KEY) {
        return Err(CleanupError::invalid(live_path, "missing data.entities"));
    }

    let mut present: HashSet<String> = live.entity_ids();
    let mut to_append = Vec::new();
    for ent in picked {
        let Some(id) = entity_id_of(ent) else {
            continue;
        };
        if present.contains(id) {
            warn!("restore: {} already exists in live registry, skipping", id);
            outcome.skipped.push(id.to_string());
            continue;
        }
        present.insert(id.to_string());
        outcome.appended.push(id.to_string());
        to_append.push(ent.clone());
    }

    if dry_run || to_append.is_empty() {
        return Ok(outcome);
    }

    // Нет снапшота — нет записи.
    outcome.backup = Some(store.backup(live_path)?);

    if let Some(list) = live.list_mut(ENTITIES_KEY) {
        list.extend(to_append);
    }
    store.save(live_path, &live)?;

    record_entities_restored(outcome.appended.len() as u64);
    info!(
        "restore: appended {} entity(ies) to {}",
        outcome.appended.len(),
        live_path.display()
    );
    Ok(outcome)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FullRestorePlan {
    pub snapshot_path: PathBuf,
    pub live_path: PathBuf,
    pub kind: SnapshotKind,
    pub snapshot_items: usize,
    /// 0 when the live file is missing.
    pub live_items: usize,
    pub live_exists: bool,
}

impl FullRestorePlan {
    pub fn delta(&self) -> i64 {
        self.snapshot_items as i64 - self.live_items as i64
    }

    /// |delta| / live (live=0 counts as 1).
    pub fn change_ratio(&self) -> f64 {
        self.delta().unsigned_abs() as f64 / self.live_items.max(1) as f64
    }

    /// Prominent warning, not a block.
    pub fn needs_warning(&self) -> bool {
        self.change_ratio() > FULL_RESTORE_WARN_RATIO
    }
}

/// Validate the snapshot's shape and measure what a full restore would change.
pub fn plan_full_restore<C: DocCache>(
    store: &mut RegistryStore<C>,
    snapshot_path: &Path,
    live_path: &Path,
) -> Result<FullRestorePlan> {
    let snap_name = snapshot_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let kind = SnapshotKind::from_file_name(snap_name);

    let snapshot = store.load(snapshot_path)?;
    let snapshot_items = match kind.list_key() {
        Some(key) => {
            if !snapshot.has_list(key) {
                return Err(CleanupError::invalid(
                    snapshot_path,
                    format!("expected data.{} array", key),
                ));
            }
            snapshot.list_len(key)
        }
        None => {
            if !snapshot.as_value().get("data").map(Value::is_object).unwrap_or(false) {
                return Err(CleanupError::invalid(snapshot_path, "expected data object"));
            }
            0
        }
    };

    let (live_items, live_exists) = match store.load(live_path) {
        Ok(doc) => (kind.list_key().map(|k| doc.list_len(k)).unwrap_or(0), true),
        Err(CleanupError::NotFound(_)) => (0, false),
        // live битый — заменить его снапшотом как раз и нужно
        Err(CleanupError::InvalidFormat { .. }) => (0, true),
        Err(e) => return Err(e),
    };

    Ok(FullRestorePlan {
        snapshot_path: snapshot_path.to_path_buf(),
        live_path: live_path.to_path_buf(),
        kind,
        snapshot_items,
        live_items,
        live_exists,
    })
}

/// Replace the live file with the snapshot's bytes. Returns the backup of the old live file.
pub fn full_restore<C: DocCache>(
    store: &mut RegistryStore<C>,
    plan: &FullRestorePlan,
) -> Result<Option<PathBuf>> {
    let bytes = fs::read(&plan.snapshot_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CleanupError::NotFound(plan.snapshot_path.clone()),
        _ => e.into(),
    })?;
    // снапшот могли подменить между plan и restore
    RegistryDoc::from_slice(&plan.snapshot_path, &bytes)?;

    let backup = if plan.live_path.exists() {
        Some(store.backup(&plan.live_path)?)
    } else {
        None
    };

    store.write_bytes(&plan.live_path, &bytes)?;
    record_entities_restored(plan.snapshot_items as u64);
    info!(
        "restore: {} replaced with {} ({} -> {} item(s))",
        plan.live_path.display(),
        plan.snapshot_path.display(),
        plan.live_items,
        plan.snapshot_items
    );
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(snapshot_items: usize, live_items: usize) -> FullRestorePlan {
        FullRestorePlan {
            snapshot_path: PathBuf::from("s"),
            live_path: PathBuf::from("l"),
            kind: SnapshotKind::EntityRegistry,
            snapshot_items,
            live_items,
            live_exists: true,
        }
    }

    #[test]
    fn warning_threshold_is_strictly_above_half() {
        assert!(!plan(150, 100).needs_warning());
        assert!(plan(151, 100).needs_warning());
        assert!(plan(10, 100).needs_warning());
        assert!(!plan(50, 100).needs_warning());
        assert_eq!(plan(40, 100).delta(), -60);
    }

    #[test]
    fn empty_live_counts_as_one() {
        assert!(plan(2, 0).needs_warning());
        assert!(!plan(0, 0).needs_warning());
    }
}
