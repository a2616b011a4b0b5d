//! cleanup — применение выбранных действий к реестрам.
//!
//! Каждая функция: загрузить → посчитать изменения → (dry-run: вернуть отчёт)
//! → снапшот файла → атомарная запись. Ошибка снапшота прерывает операцию до записи.

use log::{info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::CleanupConfig;
use crate::error::{CleanupError, Result};
use crate::metrics::{record_entities_removed, record_entities_renamed};
use crate::orphans::Orphan;
use crate::registry::doc::{DELETED_DEVICES_KEY, DELETED_ENTITIES_KEY, ENTITIES_KEY};
use crate::registry::{DocCache, RegistryStore};
use crate::suffix::SuffixCollision;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Removal {
    pub removed: usize,
    pub backup: Option<PathBuf>,
}

/// Drop the given orphans from the entity registry.
pub fn remove_orphans<C: DocCache>(
    store: &mut RegistryStore<C>,
    path: &Path,
    orphans: &[Orphan],
    dry_run: bool,
) -> Result<Removal> {
    if orphans.is_empty() {
        return Ok(Removal::default());
    }
    let targets: HashSet<&str> = orphans.iter().map(|o| o.entity_id.as_str()).collect();

    let mut doc = store.load(path)?;
    let before = doc.list_len(ENTITIES_KEY);
    let removed = doc
        .entity_values()
        .iter()
        .filter(|v| is_target(v, &targets))
        .count();

    if dry_run || removed == 0 {
        return Ok(Removal {
            removed,
            backup: None,
        });
    }

    let backup = store.backup(path)?;
    let list = doc
        .list_mut(ENTITIES_KEY)
        .ok_or_else(|| CleanupError::invalid(path, "missing data.entities"))?;
    list.retain(|v| !is_target(v, &targets));
    let after = list.len();
    store.save(path, &doc)?;

    record_entities_removed(removed as u64);
    info!(
        "cleanup: removed {} orphaned entity(ies) ({} -> {}), backup {}",
        removed,
        before,
        after,
        backup.display()
    );
    Ok(Removal {
        removed,
        backup: Some(backup),
    })
}

fn is_target(v: &Value, targets: &HashSet<&str>) -> bool {
    v.get("entity_id")
        .and_then(Value::as_str)
        .map(|id| targets.contains(id))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeletedItemsReport {
    pub deleted_entities: usize,
    pub deleted_devices: usize,
    /// Snapshots taken before each write (empty on dry-run).
    pub backups: Vec<PathBuf>,
}

impl DeletedItemsReport {
    pub fn total(&self) -> usize {
        self.deleted_entities + self.deleted_devices
    }

    /// True if an earlier step's snapshot was reused here (both writes fell in one second),
    /// so it holds the state before that step, not the state between the two.
    pub fn reuses_snapshot(&self, earlier: &Path) -> bool {
        self.backups.iter().any(|b| b == earlier)
    }
}

/// Empty `data.deleted_entities` and `data.deleted_devices` (HA's tombstone lists).
///
/// A missing or unparsable registry is skipped with a warning and the other one is
/// still processed; a failed save aborts.
pub fn clear_deleted_items<C: DocCache>(
    store: &mut RegistryStore<C>,
    cfg: &CleanupConfig,
    dry_run: bool,
) -> Result<DeletedItemsReport> {
    let mut report = DeletedItemsReport::default();
    let targets = [
        (cfg.entity_registry(), DELETED_ENTITIES_KEY),
        (cfg.device_registry(), DELETED_DEVICES_KEY),
    ];

    for (path, key) in targets {
        let mut doc = match store.load(&path) {
            Ok(d) => d,
            Err(CleanupError::NotFound(_)) => {
                warn!("cleanup: {} not found, skipping {}", path.display(), key);
                continue;
            }
            Err(e @ CleanupError::InvalidFormat { .. }) => {
                warn!("cleanup: {}, skipping {}", e, key);
                continue;
            }
            Err(e) => return Err(e),
        };
        let n = doc.list_len(key);
        if n == 0 {
            continue;
        }
        if !dry_run {
            report.backups.push(store.backup(&path)?);
            if let Some(list) = doc.list_mut(key) {
                list.clear();
            }
            store.save(&path, &doc)?;
        }
        info!(
            "{} {} {}",
            if dry_run { "Would clean" } else { "Cleaned" },
            n,
            key.replace('_', " ")
        );
        if key == DELETED_ENTITIES_KEY {
            report.deleted_entities = n;
        } else {
            report.deleted_devices = n;
        }
    }
    Ok(report)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameOutcome {
    pub renamed: Vec<(String, String)>,
    /// Base id became occupied (by the live registry or an earlier rename).
    pub skipped: Vec<String>,
    pub backup: Option<PathBuf>,
}

/// Rename each selected `old_id` to its `base_id` in the entity registry.
pub fn apply_renames<C: DocCache>(
    store: &mut RegistryStore<C>,
    path: &Path,
    selected: &[&SuffixCollision],
    dry_run: bool,
) -> Result<RenameOutcome> {
    let mut outcome = RenameOutcome::default();
    if selected.is_empty() {
        return Ok(outcome);
    }

    let mut doc = store.load(path)?;
    let mut present = doc.entity_ids();
    let mut plan: Vec<(String, String)> = Vec::new();
    for c in selected {
        if !present.contains(&c.old_id) {
            warn!("rename: {} no longer in registry, skipping", c.old_id);
            outcome.skipped.push(c.old_id.clone());
            continue;
        }
        if present.contains(&c.base_id) {
            warn!("rename: {} already exists, not renaming {}", c.base_id, c.old_id);
            outcome.skipped.push(c.old_id.clone());
            continue;
        }
        present.remove(&c.old_id);
        present.insert(c.base_id.clone());
        plan.push((c.old_id.clone(), c.base_id.clone()));
    }

    if dry_run || plan.is_empty() {
        outcome.renamed = plan;
        return Ok(outcome);
    }

    outcome.backup = Some(store.backup(path)?);
    let list = doc
        .list_mut(ENTITIES_KEY)
        .ok_or_else(|| CleanupError::invalid(path, "missing data.entities"))?;
    for (old, new) in &plan {
        for ent in list.iter_mut() {
            if ent.get("entity_id").and_then(Value::as_str) == Some(old.as_str()) {
                ent["entity_id"] = Value::String(new.clone());
            }
        }
    }
    store.save(path, &doc)?;

    record_entities_renamed(plan.len() as u64);
    info!("rename: {} entity id(s) renamed in {}", plan.len(), path.display());
    outcome.renamed = plan;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_snapshot_is_detected_by_path() {
        let report = DeletedItemsReport {
            deleted_entities: 1,
            deleted_devices: 0,
            backups: vec![PathBuf::from("/c/.storage/core.entity_registry.backup.20240101_120000")],
        };
        assert!(report.reuses_snapshot(Path::new(
            "/c/.storage/core.entity_registry.backup.20240101_120000"
        )));
        assert!(!report.reuses_snapshot(Path::new(
            "/c/.storage/core.entity_registry.backup.20240101_115959"
        )));
        assert!(!DeletedItemsReport::default().reuses_snapshot(Path::new("x")));
    }
}
