//! snapshots/diff — structural difference between a snapshot and the live entity registry.
//!
//! Сущности сопоставляются по entity_id:
//! - deleted:  есть только в снапшоте;
//! - added:    есть только в live;
//! - modified: есть в обоих, но отличается хоть одно поле из COMPARE_FIELDS.
//!
//! Сравнение — точное равенство JSON-значений; отсутствие поля отличается от
//! любого присутствующего значения, включая null.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::registry::{DocCache, RegistryDoc, RegistryStore};

pub const COMPARE_FIELDS: [&str; 5] = [
    "platform",
    "device_id",
    "config_entry_id",
    "original_name",
    "disabled_by",
];

#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: &'static str,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedEntity {
    pub entity_id: String,
    pub before: Value,
    pub after: Value,
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryDiff {
    /// Snapshot order.
    pub deleted: Vec<Value>,
    /// Live order.
    pub added: Vec<Value>,
    /// Snapshot order.
    pub modified: Vec<ModifiedEntity>,
}

impl RegistryDiff {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.added.is_empty() && self.modified.is_empty()
    }

    pub fn deleted_ids(&self) -> Vec<&str> {
        self.deleted.iter().filter_map(entity_id_of).collect()
    }

    pub fn added_ids(&self) -> Vec<&str> {
        self.added.iter().filter_map(entity_id_of).collect()
    }
}

pub fn entity_id_of(v: &Value) -> Option<&str> {
    v.get("entity_id").and_then(Value::as_str)
}

pub fn diff_registries(snapshot: &RegistryDoc, live: &RegistryDoc) -> RegistryDiff {
    let live_by_id: HashMap<&str, &Value> = live
        .entity_values()
        .iter()
        .filter_map(|v| entity_id_of(v).map(|id| (id, v)))
        .collect();
    let snap_by_id: HashMap<&str, &Value> = snapshot
        .entity_values()
        .iter()
        .filter_map(|v| entity_id_of(v).map(|id| (id, v)))
        .collect();

    let mut diff = RegistryDiff::default();

    for before in snapshot.entity_values() {
        let Some(id) = entity_id_of(before) else {
            continue;
        };
        match live_by_id.get(id) {
            None => diff.deleted.push(before.clone()),
            Some(after) => {
                let changes = compare_fields(before, after);
                if !changes.is_empty() {
                    diff.modified.push(ModifiedEntity {
                        entity_id: id.to_string(),
                        before: before.clone(),
                        after: (*after).clone(),
                        changes,
                    });
                }
            }
        }
    }

    for after in live.entity_values() {
        if let Some(id) = entity_id_of(after) {
            if !snap_by_id.contains_key(id) {
                diff.added.push(after.clone());
            }
        }
    }

    diff
}

fn compare_fields(before: &Value, after: &Value) -> Vec<FieldChange> {
    COMPARE_FIELDS
        .iter()
        .filter_map(|&field| {
            let b = before.get(field);
            let a = after.get(field);
            if b == a {
                None
            } else {
                Some(FieldChange {
                    field,
                    before: b.cloned(),
                    after: a.cloned(),
                })
            }
        })
        .collect()
}

/// Load both documents and diff them.
pub fn diff_snapshot<C: DocCache>(
    store: &mut RegistryStore<C>,
    snapshot_path: &Path,
    live_path: &Path,
) -> Result<RegistryDiff> {
    let snapshot = store.load(snapshot_path)?;
    let live = store.load(live_path)?;
    Ok(diff_registries(&snapshot, &live))
}
